// Copyright (C) 2019-2025, Lux Industries Inc. All rights reserved.
// See the file LICENSE for licensing terms.

//! Simulation harness (C9): an in-process multi-node simulator that drives
//! the same Photon/Emitter/quorum code paths production uses, with a
//! configurable Byzantine fraction and initial preference split.
//!
//! Doubles as the reference oracle for the S3 scenario (spec §8):
//! Byzantine nodes vote opposite to the current honest majority
//! preference every round, and the simulation reports whether the honest
//! supermajority converges within a round budget.

use std::sync::Arc;

use log::debug;

use crate::emitter;
use crate::id::{Id, NodeId};
use crate::params::Parameters;
use crate::photon::{Photon, PollOutcome, VoteBag};

/// The two candidate choices a simulated network decides between.
pub const CHOICE_ZERO: Id = Id([0x00; 32]);
pub const CHOICE_ONE: Id = Id([0x11; 32]);

/// Simulation configuration.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub params: Arc<Parameters>,
    pub node_count: u32,
    pub byzantine_count: u32,
    /// Fraction of honest nodes (0.0..=1.0) initially preferring `CHOICE_ZERO`;
    /// the rest start on `CHOICE_ONE`.
    pub initial_split: f64,
    pub max_rounds: u64,
    pub seed: [u8; 32],
}

impl SimConfig {
    pub fn new(params: Arc<Parameters>, node_count: u32, byzantine_count: u32, initial_split: f64) -> Self {
        SimConfig { params, node_count, byzantine_count, initial_split, max_rounds: 1000, seed: [0u8; 32] }
    }
}

/// Outcome of a completed simulation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimResult {
    pub rounds: u64,
    pub finalized: bool,
    pub final_choice: Option<Id>,
    pub agreement_ratio: f64,
    pub network_queries: u64,
}

struct Node {
    id: NodeId,
    byzantine: bool,
    photon: Photon<Id>,
}

/// Runs a full simulation to completion (finalized or `max_rounds` exhausted).
///
/// Honest nodes reply to a poll with their current Photon preference.
/// Byzantine nodes reply with the choice opposite the current honest
/// majority, recomputed every round — this is what stress-tests the
/// confidence-reset path rather than merely refusing to vote.
pub fn run(config: &SimConfig) -> SimResult {
    let p = &config.params;
    let node_ids: Vec<NodeId> = (0..config.node_count).map(|i| NodeId::from(node_bytes(i))).collect();
    let honest_count = config.node_count.saturating_sub(config.byzantine_count);
    let zero_count = ((honest_count as f64) * config.initial_split).round() as u32;

    let mut nodes: Vec<Node> = Vec::with_capacity(config.node_count as usize);
    for (i, id) in node_ids.iter().enumerate() {
        let byzantine = (i as u32) < config.byzantine_count;
        let honest_index = (i as u32).saturating_sub(config.byzantine_count);
        let initial_choice = if !byzantine && honest_index < zero_count { CHOICE_ZERO } else { CHOICE_ONE };
        let mut photon = Photon::unary(p.alpha_pref, p.alpha_conf, p.beta);
        photon.add(initial_choice).expect("fresh photon accepts its first choice");
        nodes.push(Node { id: *id, byzantine, photon });
    }

    let mut network_queries = 0u64;
    let mut round = 0u64;

    loop {
        if nodes.iter().filter(|n| !n.byzantine).all(|n| n.photon.finalized()) {
            break;
        }
        if round >= config.max_rounds {
            break;
        }

        let majority_choice = honest_majority_choice(&nodes);

        let preferences: Vec<(NodeId, bool, Id)> = nodes
            .iter()
            .map(|n| {
                let reply = if n.byzantine {
                    flip(majority_choice)
                } else {
                    n.photon.preference().copied().unwrap_or(majority_choice)
                };
                (n.id, n.byzantine, reply)
            })
            .collect();

        for idx in 0..nodes.len() {
            if nodes[idx].byzantine || nodes[idx].photon.finalized() {
                continue;
            }
            let committee = emitter::emit(&node_ids, p.k, &committee_seed(&config.seed, round, nodes[idx].id));
            let mut bag: VoteBag<Id> = VoteBag::new();
            for member in &committee {
                if let Some((_, _, choice)) = preferences.iter().find(|(id, _, _)| id == member) {
                    bag.insert(*choice);
                    network_queries += 1;
                }
            }
            let outcome = nodes[idx].photon.record_votes(&bag);
            if outcome == PollOutcome::JustFinalized {
                debug!("sim: node {} finalized at round {round}", nodes[idx].id);
            }
        }

        round += 1;
    }

    let honest: Vec<&Node> = nodes.iter().filter(|n| !n.byzantine).collect();
    let all_finalized = honest.iter().all(|n| n.photon.finalized());
    let final_choice = majority_final_choice(&honest);
    let agreeing = honest.iter().filter(|n| n.photon.preference() == final_choice.as_ref()).count();
    let agreement_ratio = if honest.is_empty() { 1.0 } else { agreeing as f64 / honest.len() as f64 };

    SimResult { rounds: round, finalized: all_finalized, final_choice, agreement_ratio, network_queries }
}

fn node_bytes(i: u32) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[28..32].copy_from_slice(&i.to_be_bytes());
    bytes
}

fn committee_seed(base: &[u8; 32], round: u64, node: NodeId) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(base);
    hasher.update(&round.to_be_bytes());
    hasher.update(node.as_bytes());
    *hasher.finalize().as_bytes()
}

fn flip(choice: Id) -> Id {
    if choice == CHOICE_ZERO {
        CHOICE_ONE
    } else {
        CHOICE_ZERO
    }
}

fn honest_majority_choice(nodes: &[Node]) -> Id {
    let zero = nodes.iter().filter(|n| !n.byzantine && n.photon.preference() == Some(&CHOICE_ZERO)).count();
    let one = nodes.iter().filter(|n| !n.byzantine && n.photon.preference() == Some(&CHOICE_ONE)).count();
    if zero >= one {
        CHOICE_ZERO
    } else {
        CHOICE_ONE
    }
}

fn majority_final_choice(honest: &[&Node]) -> Option<Id> {
    let zero = honest.iter().filter(|n| n.photon.preference() == Some(&CHOICE_ZERO)).count();
    let one = honest.iter().filter(|n| n.photon.preference() == Some(&CHOICE_ONE)).count();
    if zero == 0 && one == 0 {
        None
    } else if zero >= one {
        Some(CHOICE_ZERO)
    } else {
        Some(CHOICE_ONE)
    }
}

/// Drives `run` across an independent batch of configs in parallel when the
/// `simd` feature is enabled, falling back to sequential iteration otherwise.
/// This is the one place the optional `rayon` dependency does real work
/// rather than only gating `blake3`.
pub fn run_batch(configs: &[SimConfig]) -> Vec<SimResult> {
    #[cfg(feature = "simd")]
    {
        use rayon::prelude::*;
        configs.par_iter().map(run).collect()
    }
    #[cfg(not(feature = "simd"))]
    {
        configs.iter().map(run).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unanimous_honest_network_finalizes_fast() {
        let params = Arc::new(Parameters::builder().k(5).beta(4).build().unwrap());
        let config = SimConfig::new(params, 10, 0, 1.0);
        let result = run(&config);
        assert!(result.finalized);
        assert_eq!(result.final_choice, Some(CHOICE_ZERO));
        assert_eq!(result.agreement_ratio, 1.0);
    }

    // S3: 100 nodes, 30 Byzantine voting opposite the honest majority,
    // initial split 60/40, K=20 alpha_pref=15 alpha_conf=15 beta=20 ->
    // honest majority finalizes on choice 0 within 200 rounds, agreement >= 0.95.
    #[test]
    fn s3_byzantine_minority_chain() {
        let params = Arc::new(
            Parameters::builder().k(20).alpha_pref(15).alpha_conf(15).beta(20).max_outstanding_items(200).build().unwrap(),
        );
        let mut config = SimConfig::new(params, 100, 30, 0.6);
        config.max_rounds = 200;
        let result = run(&config);
        assert!(result.finalized, "expected honest majority to finalize within {} rounds", config.max_rounds);
        assert_eq!(result.final_choice, Some(CHOICE_ZERO));
        assert!(result.agreement_ratio >= 0.95, "agreement_ratio={}", result.agreement_ratio);
    }

    #[test]
    fn byzantine_fraction_above_tolerance_can_fail_to_finalize_cleanly() {
        let params = Arc::new(Parameters::builder().k(10).beta(10).build().unwrap());
        let mut config = SimConfig::new(params, 20, 15, 0.5);
        config.max_rounds = 50;
        let result = run(&config);
        // No safety claim beyond: the harness terminates and reports a ratio in range.
        assert!((0.0..=1.0).contains(&result.agreement_ratio));
        let _ = result.finalized;
    }

    #[test]
    fn run_batch_matches_sequential_run() {
        let params = Arc::new(Parameters::builder().k(5).beta(4).build().unwrap());
        let configs = vec![SimConfig::new(params.clone(), 10, 0, 1.0), SimConfig::new(params, 10, 0, 0.0)];
        let batch = run_batch(&configs);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].final_choice, Some(CHOICE_ZERO));
        assert_eq!(batch[1].final_choice, Some(CHOICE_ONE));
    }
}
