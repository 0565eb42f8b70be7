use std::fmt;

use crate::{error::PaxosError, messages::ProposalNumber};

/// Identity of a node, used as the tiebreak component of a [`ProposalId`].
pub type NodeId = u64;

/// Address under which a node's acceptor and learner are reachable.
pub type NodeAddress = String;

/// Opaque value agreed on by the cluster. The protocol only compares it for equality.
pub type Value = Vec<u8>;

/// Minimum number of acceptors, out of `n`, whose agreement is binding.
pub fn quorum(n: usize) -> usize {
    n / 2 + 1
}

/// Globally comparable proposal identifier.
///
/// Ordered by `round` first and `node_id` second, so two proposers can never produce
/// equal identifiers as long as node ids are unique. Round 0 is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProposalId {
    pub round: u64,
    pub node_id: NodeId,
}

impl ProposalId {
    pub const fn new(round: u64, node_id: NodeId) -> Self {
        Self { round, node_id }
    }

    /// Identifier with a round strictly greater than this one, owned by `node_id`.
    ///
    /// Returns `None` once the round space is exhausted.
    pub fn next(self, node_id: NodeId) -> Option<Self> {
        self.round
            .checked_add(1)
            .map(|round| Self::new(round, node_id))
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.round, self.node_id)
    }
}

impl From<ProposalId> for ProposalNumber {
    fn from(id: ProposalId) -> Self {
        ProposalNumber {
            round: id.round,
            node_id: id.node_id,
        }
    }
}

impl TryFrom<Option<ProposalNumber>> for ProposalId {
    type Error = PaxosError;

    fn try_from(number: Option<ProposalNumber>) -> Result<Self, Self::Error> {
        match number {
            None => Err(PaxosError::MalformedMessage(
                "missing proposal id".to_string(),
            )),
            Some(number) if number.round == 0 => Err(PaxosError::MalformedMessage(format!(
                "proposal id {}.{} uses round 0",
                number.round, number.node_id
            ))),
            Some(number) => Ok(ProposalId::new(number.round, number.node_id)),
        }
    }
}

/// The two phases of a Paxos round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Phase 1: prepare / promise.
    Prepare,
    /// Phase 2: accept / accepted.
    Accept,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Prepare => f.write_str("prepare"),
            Phase::Accept => f.write_str("accept"),
        }
    }
}
