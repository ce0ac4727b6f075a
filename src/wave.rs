// Copyright (C) 2019-2025, Lux Industries Inc. All rights reserved.
// See the file LICENSE for licensing terms.

//! Wave engine (C6): drives one consensus round per tick for a set of
//! active items, tallying votes from a [`VoteTransport`] into each item's
//! [`Photon`].
//!
//! Scheduling matches §5: per-item state lives behind its own
//! `parking_lot::Mutex`, partitioned by `Id` in a map guarded by a short
//! `RwLock`; no lock is held across the transport call or the finalize
//! callback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use log::{info, warn};
use parking_lot::{Mutex, RwLock};

use crate::error::{ConsensusError, Result};
use crate::fpc::FpcSelector;
use crate::id::Id;
use crate::params::Parameters;
use crate::photon::{Photon, PollOutcome, VoteBag};
use crate::ports::{CancellationToken, Clock, Decision, FinalizeSink, RandomSource, VoteTransport};
use crate::{emitter, ports::ValidatorSet};

/// Running counters surfaced through [`crate::engine::Engine::stats`].
#[derive(Debug, Default)]
pub struct WaveStats {
    pub votes_processed: AtomicU64,
    pub polls_completed: AtomicU64,
    pub items_finalized: AtomicU64,
    pub transport_failures: AtomicU64,
}

impl WaveStats {
    /// `rounds` is not tracked here — it is [`Wave`]'s own live round
    /// counter, filled in by [`Wave::stats`].
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rounds: 0,
            votes_processed: self.votes_processed.load(Ordering::Relaxed),
            polls_completed: self.polls_completed.load(Ordering::Relaxed),
            items_finalized: self.items_finalized.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub rounds: u64,
    pub votes_processed: u64,
    pub polls_completed: u64,
    pub items_finalized: u64,
    pub transport_failures: u64,
}

/// Driver for a set of concurrently-active unary Photons.
pub struct Wave {
    params: Arc<Parameters>,
    validators: RwLock<Arc<dyn ValidatorSet>>,
    transport: Arc<dyn VoteTransport>,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn RandomSource>,
    sink: Arc<dyn FinalizeSink>,
    fpc: Option<FpcSelector>,
    items: RwLock<HashMap<Id, Mutex<Photon<Id>>>>,
    outstanding: AtomicU32,
    round: AtomicU64,
    stopped: std::sync::atomic::AtomicBool,
    stats: WaveStats,
}

impl Wave {
    pub fn new(
        params: Arc<Parameters>,
        validators: Arc<dyn ValidatorSet>,
        transport: Arc<dyn VoteTransport>,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn RandomSource>,
        sink: Arc<dyn FinalizeSink>,
    ) -> Self {
        let fpc = params.fpc.as_ref().filter(|o| o.enable).map(|o| FpcSelector::new(o.theta_min, o.theta_max, o.seed));
        Wave {
            params,
            validators: RwLock::new(validators),
            transport,
            clock,
            rng,
            sink,
            fpc,
            items: RwLock::new(HashMap::new()),
            outstanding: AtomicU32::new(0),
            round: AtomicU64::new(0),
            stopped: std::sync::atomic::AtomicBool::new(false),
            stats: WaveStats::default(),
        }
    }

    /// Swaps the validator-set snapshot atomically between rounds.
    pub fn set_validators(&self, validators: Arc<dyn ValidatorSet>) {
        *self.validators.write() = validators;
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot { rounds: self.round(), ..self.stats.snapshot() }
    }

    pub fn round(&self) -> u64 {
        self.round.load(Ordering::Relaxed)
    }

    /// Registers a new item. Fails with `Backpressure` once
    /// `max_outstanding_items` is reached.
    pub fn add(&self, item: Id) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ConsensusError::EngineStopped);
        }
        let items = self.items.upgradable_read();
        if items.contains_key(&item) {
            return Ok(());
        }
        if items.len() as u32 >= self.params.max_outstanding_items {
            return Err(ConsensusError::Backpressure);
        }
        let mut items = parking_lot::RwLockUpgradableReadGuard::upgrade(items);
        items.insert(item, Mutex::new(Photon::unary(self.params.alpha_pref, self.params.alpha_conf, self.params.beta)));
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn preference(&self, item: &Id) -> Option<Id> {
        self.items.read().get(item).and_then(|p| p.lock().preference().copied())
    }

    pub fn finalized(&self, item: &Id) -> bool {
        self.items.read().get(item).map(|p| p.lock().finalized()).unwrap_or(false)
    }

    /// Directly tallies an externally-gathered vote bag against `item`,
    /// bypassing the transport — used by callers that collect votes
    /// themselves (and by the simulation harness).
    pub fn record_votes(&self, item: Id, bag: &VoteBag<Id>) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ConsensusError::EngineStopped);
        }
        let (outcome, choice) = {
            let items = self.items.read();
            let photon = match items.get(&item) {
                Some(p) => p,
                None => return Ok(()),
            };
            let mut photon = photon.lock();
            let choice = photon.preference().copied();
            (photon.record_votes(bag), choice)
        };
        self.stats.polls_completed.fetch_add(1, Ordering::Relaxed);
        self.stats.votes_processed.fetch_add(bag.total() as u64, Ordering::Relaxed);
        if outcome == PollOutcome::JustFinalized {
            self.stats.items_finalized.fetch_add(1, Ordering::Relaxed);
            if let Some(choice) = choice {
                self.sink.on_finalize(Decision { item, choice, round: self.round() });
            }
        }
        Ok(())
    }

    /// Drives exactly one round for up to `concurrent_polls` active items.
    pub fn tick(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ConsensusError::EngineStopped);
        }
        let phase = self.round.load(Ordering::SeqCst);
        let validators = self.validators.read().clone();

        let active: Vec<Id> = {
            let items = self.items.read();
            items
                .iter()
                .filter(|(_, p)| !p.lock().finalized())
                .map(|(id, _)| *id)
                .take(self.params.concurrent_polls as usize)
                .collect()
        };

        // Parallel threads with fine-grained per-item locking (§5): each
        // in-flight item gets its own thread for the duration of its
        // transport round; no lock is held across that suspension point.
        std::thread::scope(|scope| {
            for id in active {
                let validators = validators.as_ref();
                scope.spawn(move || self.run_round(id, phase, validators));
            }
        });

        self.round.fetch_add(1, Ordering::SeqCst);
        self.clock.sleep(self.params.min_round_interval);
        Ok(())
    }

    fn effective_thresholds(&self, phase: u64) -> (u32, u32) {
        match &self.fpc {
            Some(sel) => {
                let alpha = sel.select_threshold(phase, self.params.k);
                (alpha, alpha)
            }
            None => (self.params.alpha_pref, self.params.alpha_conf),
        }
    }

    fn run_round(&self, item: Id, phase: u64, validators: &dyn ValidatorSet) {
        let snapshot = validators.iter();
        let seed_material = self.rng.derive(&phase.to_be_bytes(), item.as_bytes(), 1);
        let seed_bytes = seed_material.first().copied().unwrap_or(phase).to_be_bytes();
        let committee = emitter::emit(&snapshot, self.params.k, &seed_bytes);

        let deadline = self.clock.now() + self.params.max_item_processing_time;
        let cancel = CancellationToken::new();

        match self.transport.request_votes(deadline, &committee, item, &cancel) {
            Ok(votes) => {
                let preference = self.preference(&item);
                let Some(choice) = preference else { return };

                let mut bag: VoteBag<Id> = VoteBag::new();
                for vote in votes.iter().filter(|v| v.item == item) {
                    bag.insert(vote.prefer);
                }
                self.stats.votes_processed.fetch_add(votes.len() as u64, Ordering::Relaxed);
                self.stats.polls_completed.fetch_add(1, Ordering::Relaxed);

                let (alpha_pref, alpha_conf) = self.effective_thresholds(phase);
                let outcome = {
                    let items = self.items.read();
                    let Some(photon) = items.get(&item) else { return };
                    let mut photon = photon.lock();
                    if votes.is_empty() {
                        photon.record_unsuccessful_poll();
                        PollOutcome::Continuing
                    } else {
                        photon.record_votes_with_thresholds(&bag, alpha_pref, alpha_conf)
                    }
                };

                if outcome == PollOutcome::JustFinalized {
                    self.stats.items_finalized.fetch_add(1, Ordering::Relaxed);
                    info!("wave: item {item} finalized on choice {choice} at round {phase}");
                    self.sink.on_finalize(Decision { item, choice, round: phase });
                }
            }
            Err(ConsensusError::TransportFailed) => {
                // A transport error carries no information about the
                // committee's preference, so it must not be conflated with
                // an unsuccessful poll: Photon state is left untouched.
                warn!("wave: transport failed for item {item} at round {phase}");
                self.stats.transport_failures.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.transport_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn health(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    /// Drains every outstanding, not-yet-finalized item via `on_drain`.
    pub fn drain(&self) {
        let items = self.items.read();
        for (id, photon) in items.iter() {
            if !photon.lock().finalized() {
                self.sink.on_drain(*id, ConsensusError::EngineStopped);
            }
        }
    }
}
