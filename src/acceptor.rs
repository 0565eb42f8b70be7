use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    config::NodeConfig,
    error::PaxosError,
    events::{BroadcastEventBus, PaxosEvent, PaxosEventBus},
    messages::{AcceptRequest, AcceptedReply, ChosenNotice, PrepareRequest, PromiseReply},
    storage::AcceptorStorage,
    transport::Transport,
    types::{NodeAddress, ProposalId, Value},
};

/// A value an acceptor holds together with the proposal that carried it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedProposal {
    pub id: ProposalId,
    pub value: Value,
}

/// Durable decision state of one acceptor.
///
/// `accepted.id`, when present, never exceeds `max_promised`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptorState {
    /// Highest proposal id ever promised.
    pub max_promised: Option<ProposalId>,
    /// Value currently held, if any.
    pub accepted: Option<AcceptedProposal>,
}

impl AcceptorState {
    /// State after promising `id`, or `None` if `id` is not strictly above every
    /// earlier promise.
    pub fn promise(&self, id: ProposalId) -> Option<AcceptorState> {
        if self.max_promised.is_some_and(|promised| id <= promised) {
            return None;
        }
        Some(AcceptorState {
            max_promised: Some(id),
            accepted: self.accepted.clone(),
        })
    }

    /// State after accepting `value` under `id`, or `None` if a higher proposal was
    /// promised. Accepting the exact promised proposal is allowed.
    pub fn accept(&self, id: ProposalId, value: Value) -> Option<AcceptorState> {
        if self.max_promised.is_some_and(|promised| id < promised) {
            return None;
        }
        Some(AcceptorState {
            max_promised: Some(id),
            accepted: Some(AcceptedProposal { id, value }),
        })
    }
}

/// Acceptor role of a node.
///
/// Prepare and accept handling is serialized per instance; the state lock is held until
/// the new state is stored, so a reply is never sent for state that could be lost.
pub struct Acceptor<S, T, E = BroadcastEventBus>
where
    S: AcceptorStorage,
    T: Transport,
    E: PaxosEventBus,
{
    address: NodeAddress,
    learners: Arc<[NodeAddress]>,
    acceptor_count: u32,
    state: Mutex<AcceptorState>,
    storage: Arc<S>,
    transport: Arc<T>,
    event_bus: E,
}

impl<S, T, E> Acceptor<S, T, E>
where
    S: AcceptorStorage,
    T: Transport,
    E: PaxosEventBus,
{
    /// Open the acceptor, restoring whatever state `storage` holds.
    pub async fn open(
        config: &NodeConfig,
        storage: Arc<S>,
        transport: Arc<T>,
        event_bus: E,
    ) -> Result<Self, PaxosError> {
        let state = storage.load().await?.unwrap_or_default();
        if state != AcceptorState::default() {
            info!(
                "Acceptor[{}] restored state: promised {:?}, accepted {:?}",
                config.address,
                state.max_promised,
                state.accepted.as_ref().map(|accepted| accepted.id)
            );
        }

        Ok(Self {
            address: config.address.clone(),
            learners: config.learners.clone().into(),
            acceptor_count: config.acceptor_count(),
            state: Mutex::new(state),
            storage,
            transport,
            event_bus,
        })
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    /// Current state snapshot.
    pub async fn state(&self) -> AcceptorState {
        self.state.lock().await.clone()
    }

    /// Handle `Acceptor.Prepare`. Rejections never mutate state.
    pub async fn prepare(&self, request: PrepareRequest) -> PromiseReply {
        let mut reply = PromiseReply {
            proposal_id: request.proposal_id,
            acceptor_address: self.address.clone(),
            ..PromiseReply::default()
        };

        let proposal_id = match ProposalId::try_from(request.proposal_id) {
            Ok(id) => id,
            Err(err) => {
                warn!("Acceptor[{}] rejected prepare: {err}", self.address);
                return reply;
            }
        };

        let mut state = self.state.lock().await;
        let Some(next) = state.promise(proposal_id) else {
            debug!(
                "Acceptor[{}] rejected prepare {proposal_id}, already promised {:?}",
                self.address, state.max_promised
            );
            reply.promised_id = state.max_promised.map(Into::into);
            return reply;
        };

        if let Err(err) = self.storage.store(&next).await {
            error!(
                "Acceptor[{}] failed to persist promise {proposal_id}: {err}",
                self.address
            );
            return reply;
        }
        *state = next;

        reply.granted = true;
        if let Some(accepted) = &state.accepted {
            reply.prior_accepted_id = Some(accepted.id.into());
            reply.prior_accepted_value = Some(accepted.value.clone());
        }
        drop(state);

        info!("Acceptor[{}] promised {proposal_id}", self.address);
        self.event_bus.publish(PaxosEvent::PromiseGranted {
            acceptor: self.address.clone(),
            proposal_id,
        });
        reply
    }

    /// Handle `Acceptor.Accept`. On success every learner is notified in the background.
    pub async fn accept(&self, request: AcceptRequest) -> AcceptedReply {
        let mut reply = AcceptedReply {
            proposal_id: request.proposal_id,
            acceptor_address: self.address.clone(),
            ..AcceptedReply::default()
        };

        let proposal_id = match ProposalId::try_from(request.proposal_id) {
            Ok(id) => id,
            Err(err) => {
                warn!("Acceptor[{}] rejected accept: {err}", self.address);
                return reply;
            }
        };

        let mut state = self.state.lock().await;
        let Some(next) = state.accept(proposal_id, request.value) else {
            debug!(
                "Acceptor[{}] rejected accept {proposal_id}, already promised {:?}",
                self.address, state.max_promised
            );
            reply.promised_id = state.max_promised.map(Into::into);
            return reply;
        };

        if let Err(err) = self.storage.store(&next).await {
            error!(
                "Acceptor[{}] failed to persist accept {proposal_id}: {err}",
                self.address
            );
            return reply;
        }
        *state = next;
        let value = state
            .accepted
            .as_ref()
            .map(|accepted| accepted.value.clone())
            .unwrap_or_default();
        drop(state);

        reply.granted = true;
        info!("Acceptor[{}] accepted {proposal_id}", self.address);
        self.event_bus.publish(PaxosEvent::ValueAccepted {
            acceptor: self.address.clone(),
            proposal_id,
        });
        self.notify_learners(proposal_id, value);
        reply
    }

    /// Fire-and-forget delivery of a chosen notice to every learner. Failed deliveries
    /// are logged and not retried.
    fn notify_learners(&self, proposal_id: ProposalId, value: Value) {
        let notice = ChosenNotice {
            proposal_id: Some(proposal_id.into()),
            acceptor_address: self.address.clone(),
            acceptor_count: self.acceptor_count,
            value,
        };

        for learner in self.learners.iter().cloned() {
            let transport = Arc::clone(&self.transport);
            let notice = notice.clone();
            let acceptor = self.address.clone();
            tokio::spawn(async move {
                if let Err(err) = transport.notify_chosen(&learner, notice).await {
                    warn!("Acceptor[{acceptor}] could not notify learner {learner}: {err}");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promise_requires_strictly_higher_id() {
        let state = AcceptorState::default();
        let promised = state.promise(ProposalId::new(3, 1)).unwrap();
        assert_eq!(promised.max_promised, Some(ProposalId::new(3, 1)));

        assert!(promised.promise(ProposalId::new(3, 1)).is_none());
        assert!(promised.promise(ProposalId::new(2, 9)).is_none());
        assert!(promised.promise(ProposalId::new(3, 2)).is_some());
    }

    #[test]
    fn accept_allows_the_promised_id() {
        let state = AcceptorState::default()
            .promise(ProposalId::new(4, 2))
            .unwrap();

        let accepted = state.accept(ProposalId::new(4, 2), b"v".to_vec()).unwrap();
        assert_eq!(
            accepted.accepted,
            Some(AcceptedProposal {
                id: ProposalId::new(4, 2),
                value: b"v".to_vec()
            })
        );

        assert!(state.accept(ProposalId::new(4, 1), b"w".to_vec()).is_none());
    }

    #[test]
    fn accept_above_promise_raises_promise() {
        let state = AcceptorState::default()
            .promise(ProposalId::new(1, 1))
            .unwrap();
        let accepted = state.accept(ProposalId::new(5, 3), b"v".to_vec()).unwrap();
        assert_eq!(accepted.max_promised, Some(ProposalId::new(5, 3)));

        // A prepare at the accepted id is now a tie and must be rejected.
        assert!(accepted.promise(ProposalId::new(5, 3)).is_none());
    }

    #[test]
    fn promise_keeps_accepted_value() {
        let state = AcceptorState::default()
            .accept(ProposalId::new(2, 1), b"held".to_vec())
            .unwrap();
        let promised = state.promise(ProposalId::new(5, 2)).unwrap();
        assert_eq!(promised.accepted, state.accepted);
        assert_eq!(promised.max_promised, Some(ProposalId::new(5, 2)));
    }
}
