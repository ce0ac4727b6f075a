// Copyright (C) 2019-2025, Lux Industries Inc. All rights reserved.
// See the file LICENSE for licensing terms.

//! # Lux Consensus
//!
//! A pure-Rust sampling-based BFT consensus engine: per-item preference and
//! confidence tracking (Photon), randomized committee sampling (Emitter),
//! 69%-family quorum arithmetic, a phase-varying fast-path certification
//! overlay (FPC), a linear-chain driver (Wave), and a DAG-finality variant
//! with cert/skip certificates (Nebula) — unified behind one runtime
//! facade (`Engine`).
//!
//! ```
//! use std::sync::Arc;
//! use lux_consensus::{Engine, Id, NodeId, Parameters};
//! use lux_consensus::ports::{ChaChaRandomSource, InMemoryValidatorSet, NullSink, SystemClock, Vote, VoteTransport, CancellationToken};
//! use lux_consensus::error::Result;
//!
//! struct Loopback;
//! impl VoteTransport for Loopback {
//!     fn request_votes(&self, _deadline: std::time::Instant, committee: &[NodeId], item: Id, _cancel: &CancellationToken) -> Result<Vec<Vote>> {
//!         Ok(committee.iter().map(|&from| Vote { item, prefer: item, from }).collect())
//!     }
//! }
//!
//! let validators = Arc::new(InMemoryValidatorSet::new(vec![NodeId::from([1; 32])]));
//! let engine = Engine::new_chain(
//!     Parameters::test(),
//!     validators,
//!     Arc::new(Loopback),
//!     Arc::new(SystemClock),
//!     Arc::new(ChaChaRandomSource),
//!     Arc::new(NullSink),
//! );
//! let item = Id::from([7; 32]);
//! engine.add_item(item).unwrap();
//! assert_eq!(engine.preference(&item), Some(item));
//! ```

pub mod emitter;
pub mod engine;
pub mod error;
pub mod fpc;
pub mod id;
pub mod nebula;
pub mod params;
pub mod photon;
pub mod ports;
pub mod quorum;
pub mod sim;
pub mod wave;

pub use emitter::{emit, uniform};
pub use engine::{Context, Engine, QuasarEngine, Stats};
pub use error::{ConsensusError, Result};
pub use fpc::FpcSelector;
pub use id::{Id, NodeId};
pub use nebula::{Classification, Nebula, Vertex, View};
pub use params::{FpcOverlay, Parameters, ParametersBuilder, QuantumOverlay};
pub use photon::{Photon, PhotonKind, PollOutcome, VoteBag};
pub use ports::Decision;
pub use quorum::{alpha_for_k, can_tolerate, simple_majority, super_majority};
pub use sim::{SimConfig, SimResult};
pub use wave::Wave;
