// Copyright (C) 2019-2025, Lux Industries Inc. All rights reserved.
// See the file LICENSE for licensing terms.

//! Simple consensus example using the Lux Consensus engine.
//!
//! Shows how to:
//! - Wire a chain engine with an in-memory validator set and a loopback
//!   transport
//! - Add an item and drive rounds to finalization
//! - Build a DAG engine and finalize a vertex via direct polls

use std::sync::Arc;
use std::time::Instant;

use lux_consensus::error::Result;
use lux_consensus::nebula::Vertex;
use lux_consensus::photon::VoteBag;
use lux_consensus::ports::{
    CancellationToken, ChaChaRandomSource, InMemoryValidatorSet, NullSink, SystemClock, Vote, VoteTransport,
};
use lux_consensus::{Engine, Id, NodeId, Parameters};

/// A transport where every sampled peer votes for whatever item is asked
/// about — stands in for a real network for demonstration purposes.
struct Loopback;

impl VoteTransport for Loopback {
    fn request_votes(&self, _deadline: Instant, committee: &[NodeId], item: Id, _cancel: &CancellationToken) -> Result<Vec<Vote>> {
        Ok(committee.iter().map(|&from| Vote { item, prefer: item, from }).collect())
    }
}

fn main() {
    env_logger::init();

    println!("=== Chain Engine Example ===");
    chain_example();

    println!("\n=== DAG Engine Example ===");
    dag_example();
}

fn chain_example() {
    let validators: Vec<NodeId> = (0..20u8).map(|i| NodeId::from([i; 32])).collect();
    let engine = Engine::new_chain(
        Parameters::testnet(),
        Arc::new(InMemoryValidatorSet::new(validators)),
        Arc::new(Loopback),
        Arc::new(SystemClock),
        Arc::new(ChaChaRandomSource),
        Arc::new(NullSink),
    );

    let item = Id::from([1; 32]);
    engine.add_item(item).expect("fresh item is accepted");
    println!("Added item {item}");

    for round in 0.. {
        engine.tick().expect("engine is running");
        if engine.finalized(&item) {
            println!("Item {item} finalized after {round} round(s)");
            break;
        }
        if round > 100 {
            println!("Item {item} did not finalize within 100 rounds");
            break;
        }
    }

    let stats = engine.stats();
    println!("rounds={} polls={} votes={}", stats.rounds, stats.polls_completed, stats.votes_processed);
}

fn dag_example() {
    let params = Parameters::builder().k(5).alpha_pref(3).alpha_conf(4).beta(4).build().expect("valid parameters");
    let engine = Engine::new_dag(params, Arc::new(NullSink));

    let root = Vertex { id: Id::from([0xA0; 32]), parents: vec![], height: 0, timestamp: 0, payload_hash: Id::EMPTY };
    let root_id = root.id;
    engine.add_vertex(root, |_| true).expect("root vertex verifies");

    let mut bag: VoteBag<Id> = VoteBag::new();
    bag.insert_many(root_id, 3);
    for _ in 0..4 {
        engine.record_poll(NodeId::from([1; 32]), &bag).expect("dag engine accepts polls");
    }

    println!("vertex {root_id} decided: {}", engine.finalized(&root_id));
    println!("decided set: {:?}", engine.get_decided_vertices());
}
