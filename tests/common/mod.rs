#![allow(dead_code)]

use std::{sync::Arc, time::Duration};
use tokio::time::timeout;

use single_decree_paxos::{
    config::{NodeConfig, ProposerConfig},
    events::BroadcastEventBus,
    node::Node,
    storage::InMemoryAcceptorStorage,
    transport::InMemoryTransport,
    types::Value,
};

pub const LEARN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestCluster {
    pub transport: Arc<InMemoryTransport>,
    pub nodes: Vec<Arc<Node>>,
    pub storages: Vec<InMemoryAcceptorStorage>,
    pub events: BroadcastEventBus,
}

pub fn address(index: usize) -> String {
    format!("node-{index}")
}

/// Cluster of `size` nodes, each playing all three roles, over a healthy network.
pub async fn cluster(size: usize) -> TestCluster {
    cluster_with(size, InMemoryTransport::new(), ProposerConfig::default()).await
}

pub async fn cluster_with(
    size: usize,
    transport: InMemoryTransport,
    proposer: ProposerConfig,
) -> TestCluster {
    let transport = Arc::new(transport);
    let events = BroadcastEventBus::default();
    let peers: Vec<String> = (1..=size).map(address).collect();

    let mut nodes = Vec::with_capacity(size);
    let mut storages = Vec::with_capacity(size);
    for index in 1..=size {
        let config = NodeConfig::builder(index as u64, address(index))
            .with_peers(peers.clone())
            .with_proposer_config(proposer.clone())
            .build()
            .expect("valid node config");
        let storage = InMemoryAcceptorStorage::new();
        let node = Arc::new(
            Node::open(
                config,
                Arc::new(storage.clone()),
                Arc::clone(&transport),
                events.clone(),
            )
            .await
            .expect("node should open"),
        );
        transport.register(address(index), node.clone());
        nodes.push(node);
        storages.push(storage);
    }

    TestCluster {
        transport,
        nodes,
        storages,
        events,
    }
}

impl TestCluster {
    /// Node by 1-based index, matching its address.
    pub fn node(&self, index: usize) -> &Arc<Node> {
        &self.nodes[index - 1]
    }

    /// Wait for the learner of node `index` to record a value.
    pub async fn learned(&self, index: usize) -> Value {
        timeout(LEARN_TIMEOUT, self.node(index).learner().wait_for_value())
            .await
            .expect("learner should record a value in time")
            .expect("learner is alive")
    }

    pub fn assert_no_faults(&self) {
        for node in &self.nodes {
            assert!(
                node.learner().consistency_fault().is_none(),
                "learner {} reported a consistency fault",
                node.address()
            );
        }
    }
}

pub fn fast_proposer() -> ProposerConfig {
    ProposerConfig::default()
        .with_phase_timeout(Duration::from_millis(100))
        .expect("valid timeout")
}
