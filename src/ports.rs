// Copyright (C) 2019-2025, Lux Industries Inc. All rights reserved.
// See the file LICENSE for licensing terms.

//! External collaborator interfaces (§6): the ports the core consumes.
//!
//! Wire formats, transport implementations, persistent validator-set
//! management, and real clocks/RNGs are the runtime's responsibility; the
//! core only specifies these traits and a couple of in-memory
//! implementations useful for tests and the simulation harness (C9).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::error::{ConsensusError, Result};
use crate::id::{Id, NodeId};

/// A vote returned by a [`VoteTransport`] round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vote {
    pub item: Id,
    pub prefer: Id,
    pub from: NodeId,
}

/// The `{item, choice, round}` triple delivered to [`FinalizeSink::on_finalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub item: Id,
    pub choice: Id,
    pub round: u64,
}

/// Cooperative cancellation, shared between a round's caller and its
/// transport. Checked, never polled with a lock held.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A read-only, cheaply-snapshottable validator set.
pub trait ValidatorSet: Send + Sync {
    fn len(&self) -> usize;
    fn iter(&self) -> Vec<NodeId>;
    fn contains(&self, node: &NodeId) -> bool;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A simple in-memory validator set snapshot, swappable atomically between
/// rounds by replacing the `Arc` the engine holds.
#[derive(Debug, Clone, Default)]
pub struct InMemoryValidatorSet {
    validators: Vec<NodeId>,
}

impl InMemoryValidatorSet {
    pub fn new(validators: Vec<NodeId>) -> Self {
        InMemoryValidatorSet { validators }
    }
}

impl ValidatorSet for InMemoryValidatorSet {
    fn len(&self) -> usize {
        self.validators.len()
    }

    fn iter(&self) -> Vec<NodeId> {
        self.validators.clone()
    }

    fn contains(&self, node: &NodeId) -> bool {
        self.validators.contains(node)
    }
}

/// Collects votes for one round's committee, bounded by `deadline` and
/// cancellable. A finite, possibly partial, set of votes is always
/// returned rather than an infinite stream, since the core tallies once
/// per round rather than incrementally.
pub trait VoteTransport: Send + Sync {
    fn request_votes(
        &self,
        deadline: Instant,
        committee: &[NodeId],
        item: Id,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vote>>;
}

/// Wall-clock abstraction so the engine and simulation harness can share
/// code paths under either a real or virtual clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A cryptographically strong source of per-round randomness, used by the
/// emitter (C5) to seed committee sampling. `derive` returns a stream of
/// `count` pseudo-random words keyed by `(seed, domain)`.
pub trait RandomSource: Send + Sync {
    fn derive(&self, seed: &[u8], domain: &[u8], count: usize) -> Vec<u64>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChaChaRandomSource;

impl RandomSource for ChaChaRandomSource {
    fn derive(&self, seed: &[u8], domain: &[u8], count: usize) -> Vec<u64> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(seed);
        hasher.update(domain);
        let mut rng = ChaCha20Rng::from_seed(*hasher.finalize().as_bytes());
        (0..count).map(|_| rng.next_u64()).collect()
    }
}

/// Finalization delivery. May block; the engine never holds a per-item or
/// per-vertex lock while calling into it.
pub trait FinalizeSink: Send + Sync {
    fn on_finalize(&self, decision: Decision);

    /// DAG-only: fired in addition to `on_finalize` when a vertex (rather
    /// than a chain item) is decided.
    fn on_vertex_decided(&self, _vertex: Id) {}

    /// Fired for every item still outstanding when the engine is torn down.
    fn on_drain(&self, _item: Id, _err: ConsensusError) {}
}

/// A no-op sink, useful for tests that don't care about finalization
/// notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl FinalizeSink for NullSink {
    fn on_finalize(&self, _decision: Decision) {}
}
