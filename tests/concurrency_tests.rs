mod common;

use std::{collections::HashSet, time::Duration};

use futures::future::join_all;
use single_decree_paxos::{
    config::{BackoffConfig, ProposerConfig},
    transport::InMemoryTransport,
    types::ProposalId,
};
use tokio::time::timeout;

use common::{cluster_with, fast_proposer};

fn jittery_network() -> InMemoryTransport {
    InMemoryTransport::new().with_latency(Duration::from_millis(1), Duration::from_millis(5))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_proposers_agree_on_one_value() {
    let cluster = cluster_with(5, jittery_network(), fast_proposer()).await;

    let proposals = (1..=5).map(|index| {
        let node = cluster.node(index).clone();
        tokio::spawn(async move { node.propose(format!("value-{index}").into_bytes()).await })
    });
    let results: Vec<_> = join_all(proposals)
        .await
        .into_iter()
        .map(|joined| {
            joined
                .expect("proposal task should not panic")
                .expect("proposal should be decided")
        })
        .collect();

    let decided = results[0].clone();
    assert!(results.iter().all(|value| *value == decided));
    assert!((1..=5).any(|index| decided == format!("value-{index}").into_bytes()));

    for index in 1..=5 {
        assert_eq!(cluster.learned(index).await, decided);
    }
    cluster.assert_no_faults();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_proposals_on_one_node_use_distinct_ids() {
    let cluster = cluster_with(3, jittery_network(), fast_proposer()).await;
    let node = cluster.node(1).clone();

    let proposals = (0..4).map(|index| {
        let node = node.clone();
        tokio::spawn(async move {
            node.proposer()
                .propose_detailed(format!("local-{index}").into_bytes())
                .await
        })
    });
    let decisions: Vec<_> = join_all(proposals)
        .await
        .into_iter()
        .map(|joined| {
            joined
                .expect("proposal task should not panic")
                .expect("proposal should be decided")
        })
        .collect();

    let ids: HashSet<ProposalId> = decisions.iter().map(|decision| decision.proposal_id).collect();
    assert_eq!(ids.len(), decisions.len());
    assert!(ids.iter().all(|id| id.node_id == 1));
    assert!(
        decisions
            .iter()
            .all(|decision| decision.value == decisions[0].value)
    );
    cluster.assert_no_faults();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lossy_network_never_splits_the_decision() {
    let proposer = ProposerConfig::default()
        .with_phase_timeout(Duration::from_millis(50))
        .and_then(|config| {
            config.with_backoff(BackoffConfig {
                initial: Duration::from_millis(5),
                max: Duration::from_millis(100),
                multiplier: 2.0,
            })
        })
        .expect("valid proposer config");
    let transport = jittery_network().with_loss_rate(0.1);
    let cluster = cluster_with(5, transport, proposer).await;

    let proposals = (1..=3).map(|index| {
        let node = cluster.node(index).clone();
        tokio::spawn(async move { node.propose(format!("lossy-{index}").into_bytes()).await })
    });
    let results: Vec<_> = timeout(Duration::from_secs(20), join_all(proposals))
        .await
        .expect("proposals should finish")
        .into_iter()
        .map(|joined| {
            joined
                .expect("proposal task should not panic")
                .expect("proposal should be decided")
        })
        .collect();

    let decided = results[0].clone();
    assert!(results.iter().all(|value| *value == decided));

    // Notices are not retried, so some learners may stay undecided.
    for node in &cluster.nodes {
        if let Some(learned) = node.learner().current_value() {
            assert_eq!(learned, decided);
        }
    }
    cluster.assert_no_faults();
}
