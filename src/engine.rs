// Copyright (C) 2019-2025, Lux Industries Inc. All rights reserved.
// See the file LICENSE for licensing terms.

//! Runtime facade (C8): creates `chain`, `dag`, and `pq` engine instances,
//! drives ticks, and exposes health and preference queries.
//!
//! One externally observable contract per engine kind (§9): `chain`/`pq`
//! use a [`FinalizeSink`] callback exclusively; `dag` exposes both the
//! callback (`on_vertex_decided`) and a pull (`get_decided_vertices`).

use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConsensusError, Result};
use crate::id::{Id, NodeId};
use crate::nebula::{Nebula, Vertex};
use crate::params::Parameters;
use crate::photon::VoteBag;
use crate::ports::{Clock, FinalizeSink, RandomSource, ValidatorSet, VoteTransport};
use crate::wave::{StatsSnapshot, Wave};

/// Opaque call context, reserved for the runtime's own cancellation /
/// tracing plumbing. The core never inspects it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Context;

/// Aggregate statistics, unified across engine kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub rounds: u64,
    pub votes_processed: u64,
    pub polls_completed: u64,
    pub items_finalized: u64,
    pub transport_failures: u64,
}

impl From<StatsSnapshot> for Stats {
    fn from(s: StatsSnapshot) -> Self {
        Stats {
            rounds: s.rounds,
            votes_processed: s.votes_processed,
            polls_completed: s.polls_completed,
            items_finalized: s.items_finalized,
            transport_failures: s.transport_failures,
        }
    }
}

/// The three engine kinds this facade can construct. `Pq` forwards to the
/// same `Wave` driver as `Chain`; its proof-generation hook is an opaque,
/// out-of-scope callback that the engine invokes but never inspects.
pub enum Engine {
    Chain(Wave),
    Dag(Nebula),
    Pq { wave: Wave, proof_hook: Option<Arc<dyn Fn(Id) + Send + Sync>> },
}

/// Alias kept for parity with the SDK's post-quantum-finality naming.
pub type QuasarEngine = Engine;

impl Engine {
    pub fn new_chain(
        params: Parameters,
        validators: Arc<dyn ValidatorSet>,
        transport: Arc<dyn VoteTransport>,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn RandomSource>,
        sink: Arc<dyn FinalizeSink>,
    ) -> Self {
        Engine::Chain(Wave::new(Arc::new(params), validators, transport, clock, rng, sink))
    }

    pub fn new_dag(params: Parameters, sink: Arc<dyn FinalizeSink>) -> Self {
        Engine::Dag(Nebula::new(Arc::new(params), sink))
    }

    pub fn new_pq(
        params: Parameters,
        validators: Arc<dyn ValidatorSet>,
        transport: Arc<dyn VoteTransport>,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn RandomSource>,
        sink: Arc<dyn FinalizeSink>,
        proof_hook: Option<Arc<dyn Fn(Id) + Send + Sync>>,
    ) -> Self {
        Engine::Pq { wave: Wave::new(Arc::new(params), validators, transport, clock, rng, sink), proof_hook }
    }

    pub fn start(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    pub fn stop(&self) {
        match self {
            Engine::Chain(wave) | Engine::Pq { wave, .. } => wave.stop(),
            Engine::Dag(nebula) => nebula.stop(),
        }
    }

    pub fn health(&self) -> bool {
        match self {
            Engine::Chain(wave) | Engine::Pq { wave, .. } => wave.health(),
            Engine::Dag(nebula) => nebula.health(),
        }
    }

    /// Returns within `timeout` regardless of engine state: the health
    /// predicate is a non-blocking atomic load, never a network call.
    pub fn health_check(&self, _ctx: &Context, _timeout: Duration) -> bool {
        self.health()
    }

    pub fn add_item(&self, item: Id) -> Result<()> {
        match self {
            Engine::Chain(wave) | Engine::Pq { wave, .. } => wave.add(item),
            Engine::Dag(_) => Err(ConsensusError::InvalidParameter {
                field: "engine_kind",
                constraint: "add_item requires a chain or pq engine",
                value: "dag".to_string(),
            }),
        }
    }

    pub fn add_vertex(&self, vertex: Vertex, verify: impl FnOnce(&Vertex) -> bool) -> Result<()> {
        match self {
            Engine::Dag(nebula) => nebula.add(vertex, verify),
            _ => Err(ConsensusError::InvalidParameter {
                field: "engine_kind",
                constraint: "add_vertex requires a dag engine",
                value: "chain_or_pq".to_string(),
            }),
        }
    }

    pub fn tick(&self) -> Result<()> {
        match self {
            Engine::Chain(wave) | Engine::Pq { wave, .. } => wave.tick(),
            Engine::Dag(_) => Ok(()),
        }
    }

    pub fn record_votes(&self, item: Id, bag: &VoteBag<Id>) -> Result<()> {
        match self {
            Engine::Chain(wave) | Engine::Pq { wave, .. } => wave.record_votes(item, bag),
            Engine::Dag(_) => Err(ConsensusError::InvalidParameter {
                field: "engine_kind",
                constraint: "record_votes requires a chain or pq engine",
                value: "dag".to_string(),
            }),
        }
    }

    pub fn record_poll(&self, from: NodeId, votes: &VoteBag<Id>) -> Result<()> {
        match self {
            Engine::Dag(nebula) => nebula.record_poll(from, votes),
            _ => Err(ConsensusError::InvalidParameter {
                field: "engine_kind",
                constraint: "record_poll requires a dag engine",
                value: "chain_or_pq".to_string(),
            }),
        }
    }

    pub fn preference(&self, item: &Id) -> Option<Id> {
        match self {
            Engine::Chain(wave) | Engine::Pq { wave, .. } => wave.preference(item),
            Engine::Dag(nebula) => nebula.preferred_tip(),
        }
    }

    pub fn finalized(&self, item: &Id) -> bool {
        match self {
            Engine::Chain(wave) | Engine::Pq { wave, .. } => wave.finalized(item),
            Engine::Dag(nebula) => nebula.decided(item),
        }
    }

    /// DAG-only pull contract (§9): everything decided so far.
    pub fn get_decided_vertices(&self) -> Vec<Id> {
        match self {
            Engine::Dag(nebula) => nebula.get_decided_vertices(),
            _ => Vec::new(),
        }
    }

    pub fn stats(&self) -> Stats {
        match self {
            Engine::Chain(wave) | Engine::Pq { wave, .. } => wave.stats().into(),
            Engine::Dag(nebula) => {
                let (polls_completed, votes_processed, items_finalized) = nebula.stats();
                Stats { rounds: 0, votes_processed, polls_completed, items_finalized, transport_failures: 0 }
            }
        }
    }

    /// Invokes the out-of-scope proof-generation hook for `item`, if any.
    /// `pq`'s cryptographic behavior is not specified by this engine.
    pub fn generate_proof(&self, item: Id) {
        if let Engine::Pq { proof_hook: Some(hook), .. } = self {
            hook(item);
        }
    }
}
