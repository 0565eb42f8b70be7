use std::sync::Arc;

use futures::future::BoxFuture;
use prost::Message;
use tracing::info;

use crate::{
    acceptor::Acceptor,
    config::NodeConfig,
    error::{PaxosError, TransportError},
    events::{BroadcastEventBus, PaxosEventBus},
    learner::Learner,
    messages::{AcceptRequest, ChosenNotice, Operation, PrepareRequest},
    proposer::Proposer,
    storage::{AcceptorStorage, InMemoryAcceptorStorage},
    transport::{InMemoryTransport, RpcHandler, Transport},
    types::{NodeAddress, NodeId, Value},
};

/// A cluster member playing proposer, acceptor and learner at once.
///
/// Each role keeps its own state and locking; the node only routes incoming operations.
pub struct Node<S = InMemoryAcceptorStorage, T = InMemoryTransport, E = BroadcastEventBus>
where
    S: AcceptorStorage,
    T: Transport,
    E: PaxosEventBus,
{
    config: NodeConfig,
    proposer: Proposer<T, E>,
    acceptor: Acceptor<S, T, E>,
    learner: Learner<E>,
}

impl<S, T, E> Node<S, T, E>
where
    S: AcceptorStorage,
    T: Transport,
    E: PaxosEventBus,
{
    /// Validate `config` and open all three roles. The acceptor restores its state from
    /// `storage`.
    pub async fn open(
        config: NodeConfig,
        storage: Arc<S>,
        transport: Arc<T>,
        event_bus: E,
    ) -> Result<Self, PaxosError> {
        config.validate()?;

        let proposer = Proposer::new(
            config.node_id,
            config.acceptors.clone(),
            Arc::clone(&transport),
            config.proposer.clone(),
            event_bus.clone(),
        )?;
        let acceptor = Acceptor::open(&config, storage, transport, event_bus.clone()).await?;
        let learner = Learner::new(
            config.address.clone(),
            config.acceptors.iter().cloned(),
            event_bus,
        );

        info!(
            "Node {} opened at {} with {} acceptors and {} learners",
            config.node_id,
            config.address,
            config.acceptors.len(),
            config.learners.len()
        );
        Ok(Self {
            config,
            proposer,
            acceptor,
            learner,
        })
    }

    pub fn id(&self) -> NodeId {
        self.config.node_id
    }

    pub fn address(&self) -> &NodeAddress {
        &self.config.address
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn proposer(&self) -> &Proposer<T, E> {
        &self.proposer
    }

    pub fn acceptor(&self) -> &Acceptor<S, T, E> {
        &self.acceptor
    }

    pub fn learner(&self) -> &Learner<E> {
        &self.learner
    }

    /// Shorthand for [`Proposer::propose`] on this node's proposer.
    pub async fn propose(&self, value: Value) -> Result<Value, PaxosError> {
        self.proposer.propose(value).await
    }

    /// Decode `payload` as the request of `operation`, run it on the matching role and
    /// encode the reply.
    pub async fn dispatch(
        &self,
        operation: Operation,
        payload: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        match operation {
            Operation::Prepare => {
                let request = PrepareRequest::decode(payload)?;
                Ok(self.acceptor.prepare(request).await.encode_to_vec())
            }
            Operation::Accept => {
                let request = AcceptRequest::decode(payload)?;
                Ok(self.acceptor.accept(request).await.encode_to_vec())
            }
            Operation::ReceiveChosen => {
                let notice = ChosenNotice::decode(payload)?;
                let ack = self
                    .learner
                    .receive_chosen(notice)
                    .map_err(|err| TransportError::Remote(err.to_string()))?;
                Ok(ack.encode_to_vec())
            }
        }
    }
}

impl<S, T, E> RpcHandler for Node<S, T, E>
where
    S: AcceptorStorage,
    T: Transport,
    E: PaxosEventBus,
{
    fn handle(
        &self,
        operation: Operation,
        payload: Vec<u8>,
    ) -> BoxFuture<'_, Result<Vec<u8>, TransportError>> {
        Box::pin(async move { self.dispatch(operation, &payload).await })
    }
}
