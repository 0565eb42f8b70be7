use std::time::Duration;

use single_decree_paxos::{
    config::{BackoffConfig, NodeConfig, ProposerConfig},
    error::PaxosError,
};

fn peers() -> Vec<String> {
    vec!["a".to_string(), "b".to_string(), "c".to_string()]
}

fn assert_invalid<T: std::fmt::Debug>(result: Result<T, PaxosError>) {
    assert!(
        matches!(result, Err(PaxosError::InvalidConfiguration(_))),
        "expected invalid configuration, got {result:?}"
    );
}

#[test]
fn test_default_proposer_config() {
    let config = ProposerConfig::default();
    assert_eq!(config.phase_timeout(), Duration::from_millis(200));
    assert_eq!(config.max_attempts(), None);
    assert_eq!(config.backoff().initial, Duration::from_millis(10));
    assert_eq!(config.backoff().max, Duration::from_secs(1));
}

#[test]
fn test_builder_sets_peers_for_both_roles() {
    let config = NodeConfig::builder(2, "b")
        .with_peers(peers())
        .build()
        .expect("valid config");
    assert_eq!(config.node_id, 2);
    assert_eq!(config.acceptors, peers());
    assert_eq!(config.learners, peers());
    assert_eq!(config.acceptor_count(), 3);
}

#[test]
fn test_learners_may_differ_from_acceptors() {
    let config = NodeConfig::builder(1, "a")
        .with_acceptors(peers())
        .with_learners(["observer"])
        .build()
        .expect("valid config");
    assert_eq!(config.learners, vec!["observer".to_string()]);
}

#[test]
fn test_builder_rejects_bad_membership() {
    assert_invalid(NodeConfig::builder(1, "a").build());
    assert_invalid(NodeConfig::builder(1, "").with_peers(peers()).build());
    assert_invalid(
        NodeConfig::builder(1, "a")
            .with_acceptors(["a", "b", "a"])
            .build(),
    );
    assert_invalid(
        NodeConfig::builder(1, "a")
            .with_acceptors(peers())
            .with_learners(["x", ""])
            .build(),
    );
}

#[test]
fn test_proposer_config_rejects_bad_values() {
    assert_invalid(ProposerConfig::default().with_phase_timeout(Duration::ZERO));
    assert_invalid(ProposerConfig::default().with_max_attempts(Some(0)));
    assert_invalid(ProposerConfig::default().with_backoff(BackoffConfig {
        multiplier: 0.5,
        ..BackoffConfig::default()
    }));
    assert_invalid(ProposerConfig::default().with_backoff(BackoffConfig {
        multiplier: f64::NAN,
        ..BackoffConfig::default()
    }));
    assert_invalid(ProposerConfig::default().with_backoff(BackoffConfig {
        initial: Duration::from_secs(5),
        max: Duration::from_secs(1),
        multiplier: 2.0,
    }));

    let bounded = ProposerConfig::default()
        .with_max_attempts(Some(4))
        .expect("valid attempt bound");
    assert_eq!(bounded.max_attempts(), Some(4));
}
