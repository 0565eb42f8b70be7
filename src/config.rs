use std::{collections::HashSet, time::Duration};

use rand::Rng;

use crate::{
    error::PaxosError,
    types::{NodeAddress, NodeId},
};

/// Exponential backoff with jitter applied between proposal rounds.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Upper bound for the un-jittered delay.
    pub max: Duration,
    /// Growth factor per retry.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(10),
            max: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `retry` (0-based), jittered to 50%..150%.
    pub fn duration(&self, retry: u32, rng: &mut impl Rng) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max.as_secs_f64());
        let jitter = rng.random_range(0.5..1.5);
        Duration::from_secs_f64(capped * jitter)
    }

    pub fn validate(&self) -> Result<(), PaxosError> {
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(PaxosError::InvalidConfiguration(format!(
                "backoff multiplier must be at least 1.0, got {}",
                self.multiplier
            )));
        }
        if self.initial > self.max {
            return Err(PaxosError::InvalidConfiguration(
                "initial backoff must not exceed max backoff".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ProposerConfig {
    /// How long a phase waits for a quorum decision before the round is abandoned.
    phase_timeout: Duration,
    /// Delay policy between abandoned rounds.
    backoff: BackoffConfig,
    /// Maximum number of rounds per `propose` call. `None` retries until decided.
    max_attempts: Option<u32>,
}

impl Default for ProposerConfig {
    fn default() -> Self {
        Self {
            phase_timeout: Duration::from_millis(200),
            backoff: BackoffConfig::default(),
            max_attempts: None,
        }
    }
}

impl ProposerConfig {
    /// Set the per-phase timeout (validated) and return the updated config.
    pub fn with_phase_timeout(mut self, phase_timeout: Duration) -> Result<Self, PaxosError> {
        if phase_timeout.is_zero() {
            return Err(PaxosError::InvalidConfiguration(
                "phase timeout must be greater than zero".to_string(),
            ));
        }
        self.phase_timeout = phase_timeout;
        Ok(self)
    }

    /// Set the backoff policy (validated) and return the updated config.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Result<Self, PaxosError> {
        backoff.validate()?;
        self.backoff = backoff;
        Ok(self)
    }

    /// Cap the number of rounds per proposal (validated) and return the updated config.
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Result<Self, PaxosError> {
        if max_attempts == Some(0) {
            return Err(PaxosError::InvalidConfiguration(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        self.max_attempts = max_attempts;
        Ok(self)
    }

    pub fn phase_timeout(&self) -> Duration {
        self.phase_timeout
    }

    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}

/// Everything a node needs to know about itself and its cluster.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Tiebreak component of every proposal id this node issues.
    pub node_id: NodeId,
    /// Address this node's acceptor reports in its replies.
    pub address: NodeAddress,
    /// Full acceptor set, used by this node's proposer.
    pub acceptors: Vec<NodeAddress>,
    /// Full learner set, notified by this node's acceptor.
    pub learners: Vec<NodeAddress>,
    pub proposer: ProposerConfig,
}

impl NodeConfig {
    pub fn builder(node_id: NodeId, address: impl Into<NodeAddress>) -> NodeConfigBuilder {
        NodeConfigBuilder::new(node_id, address.into())
    }

    pub fn validate(&self) -> Result<(), PaxosError> {
        if self.address.is_empty() {
            return Err(PaxosError::InvalidConfiguration(
                "node address must not be empty".to_string(),
            ));
        }
        if self.acceptors.is_empty() {
            return Err(PaxosError::InvalidConfiguration(
                "at least one acceptor is required".to_string(),
            ));
        }
        ensure_unique("acceptor", &self.acceptors)?;
        ensure_unique("learner", &self.learners)?;
        self.proposer.backoff.validate()?;
        Ok(())
    }

    /// Size of the acceptor set as carried in chosen notices.
    pub fn acceptor_count(&self) -> u32 {
        u32::try_from(self.acceptors.len()).unwrap_or(u32::MAX)
    }
}

fn ensure_unique(role: &str, addresses: &[NodeAddress]) -> Result<(), PaxosError> {
    let mut seen = HashSet::new();
    for address in addresses {
        if address.is_empty() {
            return Err(PaxosError::InvalidConfiguration(format!(
                "empty {role} address"
            )));
        }
        if !seen.insert(address) {
            return Err(PaxosError::InvalidConfiguration(format!(
                "duplicate {role} address {address}"
            )));
        }
    }
    Ok(())
}

pub struct NodeConfigBuilder {
    config: NodeConfig,
}

impl NodeConfigBuilder {
    fn new(node_id: NodeId, address: NodeAddress) -> Self {
        Self {
            config: NodeConfig {
                node_id,
                address,
                acceptors: Vec::new(),
                learners: Vec::new(),
                proposer: ProposerConfig::default(),
            },
        }
    }

    /// Set the full acceptor set
    pub fn with_acceptors<I, A>(mut self, acceptors: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<NodeAddress>,
    {
        self.config.acceptors = acceptors.into_iter().map(Into::into).collect();
        self
    }

    /// Set the full learner set
    pub fn with_learners<I, A>(mut self, learners: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<NodeAddress>,
    {
        self.config.learners = learners.into_iter().map(Into::into).collect();
        self
    }

    /// Use the same address list for acceptors and learners, the usual layout
    /// when every node plays all three roles.
    pub fn with_peers<I, A>(self, peers: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<NodeAddress>,
    {
        let peers: Vec<NodeAddress> = peers.into_iter().map(Into::into).collect();
        self.with_acceptors(peers.clone()).with_learners(peers)
    }

    pub fn with_proposer_config(mut self, proposer: ProposerConfig) -> Self {
        self.config.proposer = proposer;
        self
    }

    pub fn validate(&self) -> Result<(), PaxosError> {
        self.config.validate()
    }

    /// Build the final NodeConfig
    pub fn build(self) -> Result<NodeConfig, PaxosError> {
        self.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn backoff_grows_and_is_capped() {
        let backoff = BackoffConfig {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(100),
            multiplier: 2.0,
        };
        let mut rng = StdRng::seed_from_u64(7);

        let first = backoff.duration(0, &mut rng);
        assert!(first >= Duration::from_millis(5) && first < Duration::from_millis(15));

        let capped = backoff.duration(20, &mut rng);
        assert!(capped >= Duration::from_millis(50) && capped < Duration::from_millis(150));
    }

    #[test]
    fn backoff_rejects_shrinking_multiplier() {
        let backoff = BackoffConfig {
            multiplier: 0.5,
            ..BackoffConfig::default()
        };
        assert!(backoff.validate().is_err());
    }
}
