// Copyright (C) 2019-2025, Lux Industries Inc. All rights reserved.
// See the file LICENSE for licensing terms.

//! Emitter (C5): uniform random committee sampling over a validator set.
//!
//! Draw order is determined solely by `seed` and the validator set's
//! iteration order (stable, observable): two honest peers with identical
//! inputs always produce identical committees, which is what makes FPC
//! threshold selection reproducible across the network.

use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::id::NodeId;

/// Derives a 32-byte RNG seed from an arbitrary byte string via BLAKE3,
/// so any seed material (a phase counter, a round number, caller-supplied
/// bytes) maps onto `ChaCha20Rng`'s seed space deterministically.
fn derive_seed(seed: &[u8]) -> [u8; 32] {
    *blake3::hash(seed).as_bytes()
}

/// Produces exactly `k` node ids.
///
/// Draws distinct node ids without replacement when `k <= validators.len()`;
/// when `k` exceeds the validator count (single-node and tiny-network
/// cases), pads by repeating earlier draws so the result always has length
/// `k` exactly.
pub fn emit(validators: &[NodeId], k: u32, seed: &[u8]) -> Vec<NodeId> {
    let k = k as usize;
    if validators.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut rng = ChaCha20Rng::from_seed(derive_seed(seed));
    let n = validators.len();

    // Fisher-Yates partial shuffle over a stable index array, bounded by
    // min(k, n) so the result is deterministic given (seed, validators).
    let mut indices: Vec<usize> = (0..n).collect();
    let draws = k.min(n);
    for i in 0..draws {
        let j = i + (rng.next_u32() as usize % (n - i));
        indices.swap(i, j);
    }

    let mut committee: Vec<NodeId> = indices[..draws].iter().map(|&i| validators[i]).collect();
    // Pad by repeating earlier draws when K > |validators|.
    while committee.len() < k {
        let idx = committee.len() % draws.max(1);
        committee.push(committee[idx]);
    }
    committee
}

/// Convenience variant keyed by the current round number.
pub fn uniform(validators: &[NodeId], k: u32, round: u64) -> Vec<NodeId> {
    emit(validators, k, &round.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validators(n: usize) -> Vec<NodeId> {
        (0..n).map(|i| NodeId::from([i as u8; 32])).collect()
    }

    #[test]
    fn committee_has_exact_length() {
        let v = validators(50);
        let c = emit(&v, 20, b"seed");
        assert_eq!(c.len(), 20);
    }

    #[test]
    fn committee_is_distinct_when_k_le_n() {
        let v = validators(50);
        let c = emit(&v, 20, b"seed");
        let set: std::collections::HashSet<_> = c.iter().collect();
        assert_eq!(set.len(), 20);
    }

    #[test]
    fn committee_pads_when_k_exceeds_n() {
        let v = validators(3);
        let c = emit(&v, 7, b"seed");
        assert_eq!(c.len(), 7);
        // All emitted ids must come from the validator set.
        for id in &c {
            assert!(v.contains(id));
        }
    }

    #[test]
    fn single_node_network() {
        let v = validators(1);
        let c = emit(&v, 5, b"seed");
        assert_eq!(c.len(), 5);
        assert!(c.iter().all(|id| *id == v[0]));
    }

    #[test]
    fn deterministic_given_same_seed_and_validators() {
        let v = validators(50);
        let a = emit(&v, 20, b"round-7");
        let b = emit(&v, 20, b"round-7");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_seeds_tend_to_differ() {
        let v = validators(50);
        let a = emit(&v, 20, b"round-7");
        let b = emit(&v, 20, b"round-8");
        assert_ne!(a, b);
    }

    #[test]
    fn empty_validator_set_yields_empty_committee() {
        let c = emit(&[], 5, b"seed");
        assert!(c.is_empty());
    }

    #[test]
    fn uniform_keys_by_round_number() {
        let v = validators(10);
        let a = uniform(&v, 5, 1);
        let b = uniform(&v, 5, 1);
        let c = uniform(&v, 5, 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
