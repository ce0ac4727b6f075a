// Copyright (C) 2019-2025, Lux Industries Inc. All rights reserved.
// See the file LICENSE for licensing terms.

//! The closed error taxonomy of the consensus engine.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ConsensusError>;

/// The closed set of error kinds the engine can surface.
///
/// `InvalidParameter` and `EngineStopped` are surfaced to the caller
/// verbatim. `TransportFailed` and `VerificationFailed` are recovered
/// locally by the engine and only recorded as statistics. `AlreadyCommitted`
/// is surfaced but never poisons engine state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("invalid parameter `{field}`: {constraint} (got {value})")]
    InvalidParameter {
        field: &'static str,
        constraint: &'static str,
        value: String,
    },

    #[error("item already committed to a different choice")]
    AlreadyCommitted,

    #[error("outstanding item count exceeds the configured cap")]
    Backpressure,

    #[error("vote transport failed to yield a usable tally")]
    TransportFailed,

    #[error("DAG vertex failed its verify hook")]
    VerificationFailed,

    #[error("operation attempted after engine stop()")]
    EngineStopped,
}
