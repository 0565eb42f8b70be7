use tokio::sync::broadcast;

use crate::{
    learner::ConsistencyFault,
    types::{NodeAddress, NodeId, Phase, ProposalId, Value},
};

/// Why a proposer gave up on a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// Enough acceptors rejected or failed that a quorum became impossible.
    QuorumImpossible,
    /// The phase timer fired before a quorum decision.
    TimedOut,
}

#[derive(Debug, Clone)]
pub enum PaxosEvent {
    /// An acceptor promised not to accept anything below `proposal_id`.
    PromiseGranted {
        acceptor: NodeAddress,
        proposal_id: ProposalId,
    },
    /// An acceptor accepted a value.
    ValueAccepted {
        acceptor: NodeAddress,
        proposal_id: ProposalId,
    },
    /// A proposer abandoned a round and will retry with a higher proposal id.
    RoundAbandoned {
        node_id: NodeId,
        proposal_id: ProposalId,
        phase: Phase,
        reason: AbandonReason,
    },
    /// A quorum accepted `value`; the proposer returns it to its caller.
    ValueDecided {
        node_id: NodeId,
        proposal_id: ProposalId,
        value: Value,
    },
    /// A learner recorded the chosen value.
    ValueLearned {
        learner: NodeAddress,
        proposal_id: ProposalId,
        value: Value,
    },
    /// A learner was told about two different chosen values.
    ConsistencyFault(ConsistencyFault),
}

pub trait PaxosEventBus: Clone + Send + Sync + 'static {
    /// Type returned to consumers that subscribe to protocol events.
    type Receiver;

    fn subscribe(&self) -> Self::Receiver;
    fn publish(&self, event: PaxosEvent);
}

#[derive(Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<PaxosEvent>,
}

impl BroadcastEventBus {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl PaxosEventBus for BroadcastEventBus {
    type Receiver = broadcast::Receiver<PaxosEvent>;

    fn subscribe(&self) -> Self::Receiver {
        self.sender.subscribe()
    }

    fn publish(&self, event: PaxosEvent) {
        let _ = self.sender.send(event);
    }
}
