//! Remote-call seam between the protocol roles.
//!
//! [`Transport`] is what the core consumes: one synchronous, single-attempt call per
//! operation with no built-in retry. [`RpcHandler`] is the server side a transport
//! delivers encoded requests to. [`InMemoryTransport`] connects both inside one process
//! and can simulate partitions, message loss and latency.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::Arc,
    time::Duration,
};

use futures::future::BoxFuture;
use parking_lot::RwLock;
use prost::Message;
use rand::Rng;
use tracing::debug;

use crate::{
    error::TransportError,
    messages::{
        Ack, AcceptRequest, AcceptedReply, ChosenNotice, Operation, PrepareRequest, PromiseReply,
    },
    types::NodeAddress,
};

pub trait Transport: Send + Sync + 'static {
    /// `Acceptor.Prepare` on the acceptor at `acceptor`.
    fn prepare(
        &self,
        acceptor: &NodeAddress,
        request: PrepareRequest,
    ) -> impl Future<Output = Result<PromiseReply, TransportError>> + Send;

    /// `Acceptor.Accept` on the acceptor at `acceptor`.
    fn accept(
        &self,
        acceptor: &NodeAddress,
        request: AcceptRequest,
    ) -> impl Future<Output = Result<AcceptedReply, TransportError>> + Send;

    /// `Learner.ReceiveChosen` on the learner at `learner`.
    fn notify_chosen(
        &self,
        learner: &NodeAddress,
        notice: ChosenNotice,
    ) -> impl Future<Output = Result<Ack, TransportError>> + Send;
}

/// Server side of a node: decodes a request for `operation`, runs it and returns the
/// encoded reply.
pub trait RpcHandler: Send + Sync + 'static {
    fn handle(
        &self,
        operation: Operation,
        payload: Vec<u8>,
    ) -> BoxFuture<'_, Result<Vec<u8>, TransportError>>;
}

/// Process-local transport routing encoded messages by address.
pub struct InMemoryTransport {
    handlers: RwLock<HashMap<NodeAddress, Arc<dyn RpcHandler>>>,
    unreachable: RwLock<HashSet<NodeAddress>>,
    /// Probability that a request, and separately its reply, is dropped.
    loss_rate: f64,
    /// Inclusive bounds of the random one-way delay.
    latency: Option<(Duration, Duration)>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            unreachable: RwLock::new(HashSet::new()),
            loss_rate: 0.0,
            latency: None,
        }
    }

    /// Drop each request and each reply with probability `loss_rate` (clamped to 0..=1).
    pub fn with_loss_rate(mut self, loss_rate: f64) -> Self {
        self.loss_rate = if loss_rate.is_nan() {
            0.0
        } else {
            loss_rate.clamp(0.0, 1.0)
        };
        self
    }

    /// Delay each message by a random duration between `min` and `max`.
    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.latency = Some((min.min(max), min.max(max)));
        self
    }

    pub fn register(&self, address: impl Into<NodeAddress>, handler: Arc<dyn RpcHandler>) {
        self.handlers.write().insert(address.into(), handler);
    }

    pub fn deregister(&self, address: &str) -> Option<Arc<dyn RpcHandler>> {
        self.handlers.write().remove(address)
    }

    /// Make `address` unreachable until [`InMemoryTransport::heal`] is called.
    pub fn isolate(&self, address: impl Into<NodeAddress>) {
        self.unreachable.write().insert(address.into());
    }

    pub fn heal(&self, address: &str) {
        self.unreachable.write().remove(address);
    }

    pub fn heal_all(&self) {
        self.unreachable.write().clear();
    }

    pub fn is_reachable(&self, address: &str) -> bool {
        !self.unreachable.read().contains(address)
    }

    /// Send one encoded request to `address` and decode the reply.
    pub async fn call<Req, Rep>(
        &self,
        address: &NodeAddress,
        operation: Operation,
        request: Req,
    ) -> Result<Rep, TransportError>
    where
        Req: Message,
        Rep: Message + Default,
    {
        self.traverse(address).await?;
        let handler = self
            .handlers
            .read()
            .get(address)
            .cloned()
            .ok_or_else(|| TransportError::UnknownNode(address.clone()))?;

        let reply = handler.handle(operation, request.encode_to_vec()).await?;

        self.traverse(address).await?;
        debug!("{operation} to {address} answered with {} bytes", reply.len());
        Ok(Rep::decode(reply.as_slice())?)
    }

    /// One network hop to or from `address`: latency, partition and loss.
    async fn traverse(&self, address: &NodeAddress) -> Result<(), TransportError> {
        let (delay, lost) = {
            let mut rng = rand::rng();
            let delay = self.latency.map(|(min, max)| {
                let micros = rng.random_range(min.as_micros()..=max.as_micros());
                Duration::from_micros(u64::try_from(micros).unwrap_or(u64::MAX))
            });
            let lost = self.loss_rate > 0.0 && rng.random_bool(self.loss_rate);
            (delay, lost)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if !self.is_reachable(address) {
            return Err(TransportError::Unreachable(address.clone()));
        }
        if lost {
            return Err(TransportError::MessageLost(address.clone()));
        }
        Ok(())
    }
}

impl Transport for InMemoryTransport {
    async fn prepare(
        &self,
        acceptor: &NodeAddress,
        request: PrepareRequest,
    ) -> Result<PromiseReply, TransportError> {
        self.call(acceptor, Operation::Prepare, request).await
    }

    async fn accept(
        &self,
        acceptor: &NodeAddress,
        request: AcceptRequest,
    ) -> Result<AcceptedReply, TransportError> {
        self.call(acceptor, Operation::Accept, request).await
    }

    async fn notify_chosen(
        &self,
        learner: &NodeAddress,
        notice: ChosenNotice,
    ) -> Result<Ack, TransportError> {
        self.call(learner, Operation::ReceiveChosen, notice).await
    }
}
