//! Per-phase vote counting.

use crate::types::quorum;

/// Classification of one acceptor's reply within a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Granted,
    Rejected,
    /// Transport error, undecodable reply, or a reply that does not match the
    /// outstanding proposal id or acceptor.
    Failed,
}

/// Outcome of a phase once enough votes are in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseDecision {
    QuorumReached,
    QuorumImpossible,
}

/// Counts the votes of one phase against an acceptor set of size `acceptors`.
///
/// [`QuorumTally::record`] returns a decision exactly once: the first time grants reach
/// `quorum(n)` or rejections plus failures reach `n - quorum(n) + 1`. Every vote after
/// that is ignored. Owned by the single task collecting the phase's replies.
#[derive(Debug, Clone)]
pub struct QuorumTally {
    acceptors: usize,
    quorum: usize,
    granted: usize,
    rejected: usize,
    failed: usize,
    decision: Option<PhaseDecision>,
}

impl QuorumTally {
    pub fn new(acceptors: usize) -> Self {
        Self {
            acceptors,
            quorum: quorum(acceptors),
            granted: 0,
            rejected: 0,
            failed: 0,
            decision: None,
        }
    }

    pub fn record(&mut self, vote: Vote) -> Option<PhaseDecision> {
        if self.decision.is_some() {
            return None;
        }
        match vote {
            Vote::Granted => self.granted += 1,
            Vote::Rejected => self.rejected += 1,
            Vote::Failed => self.failed += 1,
        }

        let decision = if self.granted >= self.quorum {
            Some(PhaseDecision::QuorumReached)
        } else if self.rejected + self.failed >= self.acceptors + 1 - self.quorum {
            Some(PhaseDecision::QuorumImpossible)
        } else {
            None
        };
        self.decision = decision;
        decision
    }

    pub fn decision(&self) -> Option<PhaseDecision> {
        self.decision
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn granted(&self) -> usize {
        self.granted
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn failed(&self) -> usize {
        self.failed
    }
}
