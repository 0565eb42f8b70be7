use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::{
    error::PaxosError,
    events::{BroadcastEventBus, PaxosEvent, PaxosEventBus},
    messages::{Ack, ChosenNotice},
    types::{NodeAddress, ProposalId, Value, quorum},
};

/// The value a learner recorded and the proposal that carried it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChosenValue {
    pub proposal_id: ProposalId,
    pub value: Value,
}

/// Evidence that two different values were reported as chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyFault {
    pub learner: NodeAddress,
    pub chosen: ChosenValue,
    pub conflicting: ChosenValue,
    /// Acceptor whose notice exposed the conflict.
    pub reported_by: NodeAddress,
}

impl fmt::Display for ConsistencyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "learner {} holds {:?} from {} but {} reported {:?} for {}",
            self.learner,
            self.chosen.value,
            self.chosen.proposal_id,
            self.reported_by,
            self.conflicting.value,
            self.conflicting.proposal_id
        )
    }
}

/// Acceptances seen for one proposal id.
#[derive(Debug)]
struct Acceptances {
    value: Value,
    acceptors: HashSet<NodeAddress>,
}

#[derive(Debug, Default)]
struct LearnerState {
    pending: HashMap<ProposalId, Acceptances>,
    /// Highest proposal id each acceptor has reported. An acceptor only counts toward
    /// the tally of its latest acceptance.
    latest: HashMap<NodeAddress, ProposalId>,
    fault: Option<ConsistencyFault>,
}

impl LearnerState {
    /// Remove `acceptor` from the tally of `proposal_id`, dropping the tally once empty.
    fn withdraw(&mut self, acceptor: &NodeAddress, proposal_id: ProposalId) {
        if let Some(acceptances) = self.pending.get_mut(&proposal_id) {
            acceptances.acceptors.remove(acceptor);
            if acceptances.acceptors.is_empty() {
                self.pending.remove(&proposal_id);
            }
        }
    }
}

/// Learner role of a node: passively records the chosen value.
///
/// A value is recorded once a quorum of the configured acceptors report accepting it
/// under the same proposal id. Notices from addresses outside the acceptor set, or
/// disagreeing with its size, are rejected. After a value is recorded, notices repeating
/// it are acknowledged, a different value at a lower proposal id is a stale acceptance
/// and is ignored, and a different value at the chosen proposal id or above is a
/// consistency fault.
pub struct Learner<E = BroadcastEventBus>
where
    E: PaxosEventBus,
{
    address: NodeAddress,
    acceptors: HashSet<NodeAddress>,
    quorum: usize,
    chosen: watch::Sender<Option<ChosenValue>>,
    state: Mutex<LearnerState>,
    event_bus: E,
}

impl<E> Learner<E>
where
    E: PaxosEventBus,
{
    pub fn new<I, A>(address: impl Into<NodeAddress>, acceptors: I, event_bus: E) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<NodeAddress>,
    {
        let acceptors: HashSet<NodeAddress> = acceptors.into_iter().map(Into::into).collect();
        let (chosen, _) = watch::channel(None);
        Self {
            address: address.into(),
            quorum: quorum(acceptors.len()),
            acceptors,
            chosen,
            state: Mutex::new(LearnerState::default()),
            event_bus,
        }
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    /// Handle `Learner.ReceiveChosen`.
    pub fn receive_chosen(&self, notice: ChosenNotice) -> Result<Ack, PaxosError> {
        let proposal_id = ProposalId::try_from(notice.proposal_id)?;
        let acceptor = notice.acceptor_address;
        if !self.acceptors.contains(&acceptor) {
            return Err(PaxosError::MalformedMessage(format!(
                "chosen notice from unknown acceptor {acceptor:?}"
            )));
        }
        if notice.acceptor_count as usize != self.acceptors.len() {
            return Err(PaxosError::MalformedMessage(format!(
                "chosen notice from {acceptor} counts {} acceptors, expected {}",
                notice.acceptor_count,
                self.acceptors.len()
            )));
        }
        let reported = ChosenValue {
            proposal_id,
            value: notice.value,
        };

        let mut state = self.state.lock();
        if let Some(fault) = &state.fault {
            return Err(PaxosError::ConsistencyFault(Box::new(fault.clone())));
        }

        let recorded = self.chosen.borrow().clone();
        if let Some(chosen) = recorded {
            if chosen.value == reported.value {
                return Ok(Ack {});
            }
            if reported.proposal_id < chosen.proposal_id {
                debug!(
                    "Learner[{}] ignored stale acceptance {} from {acceptor}",
                    self.address, reported.proposal_id
                );
                return Ok(Ack {});
            }
            return Err(self.fault(&mut state, chosen, reported, acceptor));
        }

        if let Some(acceptances) = state.pending.get(&proposal_id)
            && acceptances.value != reported.value
        {
            let first = ChosenValue {
                proposal_id,
                value: acceptances.value.clone(),
            };
            return Err(self.fault(&mut state, first, reported, acceptor));
        }

        let latest = state.latest.get(&acceptor).copied();
        match latest {
            Some(latest) if latest > proposal_id => {
                debug!(
                    "Learner[{}] ignored {proposal_id} from {acceptor}, superseded by {latest}",
                    self.address
                );
                return Ok(Ack {});
            }
            Some(latest) if latest < proposal_id => state.withdraw(&acceptor, latest),
            _ => {}
        }
        state.latest.insert(acceptor.clone(), proposal_id);

        let acceptances = state
            .pending
            .entry(proposal_id)
            .or_insert_with(|| Acceptances {
                value: reported.value.clone(),
                acceptors: HashSet::new(),
            });
        acceptances.acceptors.insert(acceptor);

        if acceptances.acceptors.len() < self.quorum {
            debug!(
                "Learner[{}] has {}/{} acceptances for {proposal_id}",
                self.address,
                acceptances.acceptors.len(),
                self.quorum
            );
            return Ok(Ack {});
        }

        state.pending.clear();
        state.latest.clear();
        self.chosen.send_replace(Some(reported.clone()));
        drop(state);

        info!(
            "Learner[{}] learned value chosen at {proposal_id}",
            self.address
        );
        self.event_bus.publish(PaxosEvent::ValueLearned {
            learner: self.address.clone(),
            proposal_id,
            value: reported.value,
        });
        Ok(Ack {})
    }

    fn fault(
        &self,
        state: &mut LearnerState,
        chosen: ChosenValue,
        conflicting: ChosenValue,
        reported_by: NodeAddress,
    ) -> PaxosError {
        let fault = ConsistencyFault {
            learner: self.address.clone(),
            chosen,
            conflicting,
            reported_by,
        };
        error!("Learner[{}] consistency fault: {fault}", self.address);
        state.fault = Some(fault.clone());
        self.event_bus
            .publish(PaxosEvent::ConsistencyFault(fault.clone()));
        PaxosError::ConsistencyFault(Box::new(fault))
    }

    /// The recorded value, or `None` while undecided.
    pub fn current_value(&self) -> Option<Value> {
        self.chosen
            .borrow()
            .as_ref()
            .map(|chosen| chosen.value.clone())
    }

    pub fn chosen(&self) -> Option<ChosenValue> {
        self.chosen.borrow().clone()
    }

    /// Wait until a value is recorded.
    pub async fn wait_for_value(&self) -> Option<Value> {
        let mut receiver = self.chosen.subscribe();
        let chosen = receiver.wait_for(Option::is_some).await.ok()?;
        chosen.as_ref().map(|chosen| chosen.value.clone())
    }

    /// The first consistency fault observed, if any.
    pub fn consistency_fault(&self) -> Option<ConsistencyFault> {
        self.state.lock().fault.clone()
    }
}
