// Copyright (C) 2019-2025, Lux Industries Inc. All rights reserved.
// See the file LICENSE for licensing terms.

//! Photon engine (C4): the per-item unary/binary/polyadic state machine.
//!
//! The source exposes unary/binary/polyadic Photons through dynamic
//! dispatch with string-named factories; here a single generic state
//! machine is parameterized by the ballot-carrier type `T` plus a
//! [`PhotonKind`] tag, and the three named constructors simply fix the tag.

use std::collections::HashMap;
use std::hash::Hash;

use log::{debug, trace};

use crate::error::{ConsensusError, Result};
use crate::id::Id;

/// Which ballot shape a [`Photon`] was constructed for. Purely
/// informational: the state machine's behavior does not depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotonKind {
    Unary,
    Binary,
    Polyadic,
}

/// A multiset of ballots collected for one round.
#[derive(Debug, Clone, Default)]
pub struct VoteBag<T: Eq + Hash> {
    counts: HashMap<T, u32>,
}

impl<T: Eq + Hash + Clone> VoteBag<T> {
    pub fn new() -> Self {
        VoteBag { counts: HashMap::new() }
    }

    pub fn insert(&mut self, item: T) {
        *self.counts.entry(item).or_insert(0) += 1;
    }

    pub fn insert_many(&mut self, item: T, n: u32) {
        *self.counts.entry(item).or_insert(0) += n;
    }

    pub fn count(&self, item: &T) -> u32 {
        self.counts.get(item).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, &u32)> {
        self.counts.iter()
    }
}

impl<T: Eq + Hash + Clone> FromIterator<T> for VoteBag<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut bag = VoteBag::new();
        for item in iter {
            bag.insert(item);
        }
        bag
    }
}

/// Outcome of a single `record_votes` / `record_unsuccessful_poll` call.
/// Finalization callbacks are the caller's responsibility (the
/// [`crate::ports::FinalizeSink`] port), never invoked with an item lock
/// held — `Photon` itself is a pure state machine with no side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Continuing,
    JustFinalized,
}

/// Per-item consensus state machine.
///
/// `choice` locks on first `add`; `preference_strength` is monotone
/// non-decreasing and is an observability counter only, never a decision
/// input; `confidence` resets to zero on any round failing the confidence
/// threshold (not merely the preference threshold) — this is what makes
/// `beta` *consecutive* confidence-threshold rounds necessary for safety.
#[derive(Debug, Clone)]
pub struct Photon<T: Eq + Hash + Clone = Id> {
    kind: PhotonKind,
    choice: Option<T>,
    preference_strength: u32,
    confidence: u32,
    finalized: bool,
    alpha_pref: u32,
    alpha_conf: u32,
    beta: u32,
}

impl<T: Eq + Hash + Clone + std::fmt::Debug> Photon<T> {
    fn new(kind: PhotonKind, alpha_pref: u32, alpha_conf: u32, beta: u32) -> Self {
        Photon { kind, choice: None, preference_strength: 0, confidence: 0, finalized: false, alpha_pref, alpha_conf, beta }
    }

    pub fn unary(alpha_pref: u32, alpha_conf: u32, beta: u32) -> Self {
        Self::new(PhotonKind::Unary, alpha_pref, alpha_conf, beta)
    }

    pub fn binary(alpha_pref: u32, alpha_conf: u32, beta: u32) -> Self {
        Self::new(PhotonKind::Binary, alpha_pref, alpha_conf, beta)
    }

    pub fn polyadic(alpha_pref: u32, alpha_conf: u32, beta: u32) -> Self {
        Self::new(PhotonKind::Polyadic, alpha_pref, alpha_conf, beta)
    }

    pub fn kind(&self) -> PhotonKind {
        self.kind
    }

    /// Locks `choice` on first insertion; a repeat insertion of the same
    /// item is a no-op, a different item is `AlreadyCommitted`.
    pub fn add(&mut self, item: T) -> Result<()> {
        match &self.choice {
            None => {
                self.choice = Some(item);
                Ok(())
            }
            Some(existing) if *existing == item => Ok(()),
            Some(_) => Err(ConsensusError::AlreadyCommitted),
        }
    }

    pub fn preference(&self) -> Option<&T> {
        self.choice.as_ref()
    }

    pub fn preference_strength(&self) -> u32 {
        self.preference_strength
    }

    pub fn confidence(&self) -> u32 {
        self.confidence
    }

    pub fn finalized(&self) -> bool {
        self.finalized
    }

    /// Tallies `bag` against the locked-in choice, using this Photon's own
    /// fixed thresholds.
    pub fn record_votes(&mut self, bag: &VoteBag<T>) -> PollOutcome {
        let (alpha_pref, alpha_conf) = (self.alpha_pref, self.alpha_conf);
        self.record_votes_with_thresholds(bag, alpha_pref, alpha_conf)
    }

    /// Tallies `bag` using caller-supplied thresholds for this round only —
    /// the per-item `alpha_pref`/`alpha_conf` fields are left untouched.
    /// This is the hook an FPC overlay (§3, [`crate::fpc::FpcSelector`])
    /// uses to vary the effective threshold phase-by-phase without
    /// reconstructing the Photon.
    pub fn record_votes_with_thresholds(&mut self, bag: &VoteBag<T>, alpha_pref: u32, alpha_conf: u32) -> PollOutcome {
        if self.finalized {
            return PollOutcome::Continuing;
        }
        let choice = match &self.choice {
            Some(c) => c,
            None => return PollOutcome::Continuing,
        };
        let c = bag.count(choice);
        trace!("photon: tally c={c} alpha_pref={alpha_pref} alpha_conf={alpha_conf}");

        if c >= alpha_pref {
            self.preference_strength += 1;
            if c >= alpha_conf {
                self.confidence += 1;
            } else {
                self.confidence = 0;
            }
        } else {
            self.confidence = 0;
        }

        if self.confidence >= self.beta {
            self.finalized = true;
            debug!("photon: finalized after {} consecutive confident rounds", self.confidence);
            return PollOutcome::JustFinalized;
        }
        PollOutcome::Continuing
    }

    /// A round with zero usable responses: resets confidence but is not an error.
    pub fn record_unsuccessful_poll(&mut self) {
        self.confidence = 0;
    }
}
