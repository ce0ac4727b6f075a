// Copyright (C) 2019-2025, Lux Industries Inc. All rights reserved.
// See the file LICENSE for licensing terms.

//! Parameter model and validator (C1).

use std::time::Duration;

use crate::error::{ConsensusError, Result};

/// Optional fast-path certification overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct FpcOverlay {
    pub enable: bool,
    pub vote_limit_per_block: u32,
    pub vote_prefix: Vec<u8>,
    pub theta_min: f64,
    pub theta_max: f64,
    pub seed: [u8; 32],
}

impl Default for FpcOverlay {
    fn default() -> Self {
        FpcOverlay {
            enable: false,
            vote_limit_per_block: 0,
            vote_prefix: Vec::new(),
            theta_min: 0.5,
            theta_max: 0.8,
            seed: *b"lux-consensus-fpc-default-seed!",
        }
    }
}

/// Optional post-quantum overlay, passed through untouched (behavior out of scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantumOverlay {
    pub q_threshold: u32,
    pub quasar_timeout: Duration,
}

/// Immutable consensus parameters, shared by every engine instance for its
/// lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub k: u32,
    pub alpha_pref: u32,
    pub alpha_conf: u32,
    pub beta: u32,

    pub min_round_interval: Duration,
    pub max_item_processing_time: Duration,

    pub concurrent_polls: u32,
    pub optimal_processing: u32,
    pub max_outstanding_items: u32,

    /// Minimum fraction of the validator set a node must stay connected to
    /// in order to be considered healthy, in `(0, 1]`. Network connectivity
    /// itself is out of scope; this is the threshold a connectivity
    /// collaborator would compare its live-peer ratio against.
    pub min_percent_connected_healthy: f64,

    pub fpc: Option<FpcOverlay>,
    pub quantum: Option<QuantumOverlay>,
}

impl Parameters {
    /// `K − α_conf`: the number of Byzantine responses the configuration can
    /// absorb in a single round without losing confidence.
    pub fn max_byz_sample(&self) -> u32 {
        self.k.saturating_sub(self.alpha_conf)
    }

    pub fn builder() -> ParametersBuilder {
        ParametersBuilder::default()
    }

    /// Mainnet-grade parameters: large committee, high confidence bar.
    pub fn mainnet() -> Self {
        ParametersBuilder::default().k(21).beta(20).build().expect("mainnet preset is valid")
    }

    /// Testnet parameters: smaller committee for faster iteration.
    pub fn testnet() -> Self {
        ParametersBuilder::default().k(11).beta(8).build().expect("testnet preset is valid")
    }

    /// Local single-machine development parameters.
    pub fn local() -> Self {
        ParametersBuilder::default().k(5).beta(4).build().expect("local preset is valid")
    }

    /// Minimal parameters for fast unit tests.
    pub fn test() -> Self {
        ParametersBuilder::default().k(3).beta(2).build().expect("test preset is valid")
    }

    /// Degenerate K=1 preset for single-validator networks.
    pub fn single_validator() -> Self {
        ParametersBuilder::default()
            .k(1)
            .alpha_pref(1)
            .alpha_conf(1)
            .beta(1)
            .build()
            .expect("single_validator preset is valid")
    }
}

/// Fluent builder for [`Parameters`].
///
/// Setting `k` auto-adjusts `alpha_pref`/`alpha_conf` to
/// `⌈K·2/3⌉+1` / `⌈K·3/4⌉+1` unless they are overridden afterwards, so the
/// §3 invariants hold by construction for any `k` alone.
#[derive(Debug, Clone)]
pub struct ParametersBuilder {
    k: u32,
    alpha_pref: u32,
    alpha_conf: u32,
    beta: u32,
    min_round_interval: Duration,
    max_item_processing_time: Duration,
    concurrent_polls: u32,
    optimal_processing: u32,
    max_outstanding_items: u32,
    min_percent_connected_healthy: f64,
    fpc: Option<FpcOverlay>,
    quantum: Option<QuantumOverlay>,
}

fn derive_alpha_pref(k: u32) -> u32 {
    ((k as u64 * 2 + 2) / 3) as u32 + 1
}

fn derive_alpha_conf(k: u32) -> u32 {
    ((k as u64 * 3 + 3) / 4) as u32 + 1
}

impl Default for ParametersBuilder {
    fn default() -> Self {
        let k = 20;
        ParametersBuilder {
            k,
            alpha_pref: derive_alpha_pref(k).min(k),
            alpha_conf: derive_alpha_conf(k).min(k),
            beta: 20,
            min_round_interval: Duration::from_millis(100),
            max_item_processing_time: Duration::from_secs(2),
            concurrent_polls: 1,
            optimal_processing: 1,
            max_outstanding_items: 1024,
            min_percent_connected_healthy: 0.8,
            fpc: None,
            quantum: None,
        }
    }
}

impl ParametersBuilder {
    pub fn k(mut self, k: u32) -> Self {
        self.k = k;
        self.alpha_pref = derive_alpha_pref(k).min(k.max(1));
        self.alpha_conf = derive_alpha_conf(k).min(k.max(1));
        self
    }

    pub fn alpha_pref(mut self, alpha_pref: u32) -> Self {
        self.alpha_pref = alpha_pref;
        self
    }

    pub fn alpha_conf(mut self, alpha_conf: u32) -> Self {
        self.alpha_conf = alpha_conf;
        self
    }

    pub fn beta(mut self, beta: u32) -> Self {
        self.beta = beta;
        self
    }

    pub fn min_round_interval(mut self, d: Duration) -> Self {
        self.min_round_interval = d;
        self
    }

    pub fn max_item_processing_time(mut self, d: Duration) -> Self {
        self.max_item_processing_time = d;
        self
    }

    pub fn concurrent_polls(mut self, n: u32) -> Self {
        self.concurrent_polls = n;
        self
    }

    pub fn optimal_processing(mut self, n: u32) -> Self {
        self.optimal_processing = n;
        self
    }

    pub fn max_outstanding_items(mut self, n: u32) -> Self {
        self.max_outstanding_items = n;
        self
    }

    pub fn min_percent_connected_healthy(mut self, pct: f64) -> Self {
        self.min_percent_connected_healthy = pct;
        self
    }

    pub fn fpc(mut self, fpc: FpcOverlay) -> Self {
        self.fpc = Some(fpc);
        self
    }

    pub fn quantum(mut self, quantum: QuantumOverlay) -> Self {
        self.quantum = Some(quantum);
        self
    }

    pub fn build(self) -> Result<Parameters> {
        let params = Parameters {
            k: self.k,
            alpha_pref: self.alpha_pref,
            alpha_conf: self.alpha_conf,
            beta: self.beta,
            min_round_interval: self.min_round_interval,
            max_item_processing_time: self.max_item_processing_time,
            concurrent_polls: self.concurrent_polls,
            optimal_processing: self.optimal_processing,
            max_outstanding_items: self.max_outstanding_items,
            min_percent_connected_healthy: self.min_percent_connected_healthy,
            fpc: self.fpc,
            quantum: self.quantum,
        };
        validate(&params)?;
        Ok(params)
    }
}

/// Checks the §3 invariants. Returns the first violated invariant as an
/// `InvalidParameter` error.
pub fn validate(p: &Parameters) -> Result<()> {
    if p.k == 0 {
        return Err(ConsensusError::InvalidParameter {
            field: "k",
            constraint: "K>0",
            value: p.k.to_string(),
        });
    }
    if !(p.k / 2 < p.alpha_pref && p.alpha_pref <= p.k) {
        return Err(ConsensusError::InvalidParameter {
            field: "alpha_pref",
            constraint: "K/2 < alpha_pref <= K",
            value: p.alpha_pref.to_string(),
        });
    }
    if !(p.alpha_pref <= p.alpha_conf && p.alpha_conf <= p.k) {
        return Err(ConsensusError::InvalidParameter {
            field: "alpha_conf",
            constraint: "alpha_pref <= alpha_conf <= K",
            value: p.alpha_conf.to_string(),
        });
    }
    if !(p.beta > 0 && p.beta <= p.k) {
        return Err(ConsensusError::InvalidParameter {
            field: "beta",
            constraint: "0 < beta <= K",
            value: p.beta.to_string(),
        });
    }
    if !(p.concurrent_polls > 0 && p.concurrent_polls <= p.beta) {
        return Err(ConsensusError::InvalidParameter {
            field: "concurrent_polls",
            constraint: "0 < concurrent_polls <= beta",
            value: p.concurrent_polls.to_string(),
        });
    }
    if p.optimal_processing == 0 {
        return Err(ConsensusError::InvalidParameter {
            field: "optimal_processing",
            constraint: "optimal_processing > 0",
            value: p.optimal_processing.to_string(),
        });
    }
    if p.max_outstanding_items == 0 {
        return Err(ConsensusError::InvalidParameter {
            field: "max_outstanding_items",
            constraint: "max_outstanding_items > 0",
            value: p.max_outstanding_items.to_string(),
        });
    }
    if p.max_item_processing_time.is_zero() {
        return Err(ConsensusError::InvalidParameter {
            field: "max_item_processing_time",
            constraint: "max_item_processing_time > 0",
            value: format!("{:?}", p.max_item_processing_time),
        });
    }
    if !(p.min_percent_connected_healthy > 0.0 && p.min_percent_connected_healthy <= 1.0) {
        return Err(ConsensusError::InvalidParameter {
            field: "min_percent_connected_healthy",
            constraint: "0 < min_percent_connected_healthy <= 1",
            value: p.min_percent_connected_healthy.to_string(),
        });
    }
    if let Some(q) = &p.quantum {
        if q.q_threshold > p.k {
            return Err(ConsensusError::InvalidParameter {
                field: "q_threshold",
                constraint: "q_threshold <= K",
                value: q.q_threshold.to_string(),
            });
        }
    }
    Ok(())
}
