use std::{future::Future, sync::Arc};
use tokio::sync::RwLock;

use crate::{acceptor::AcceptorState, error::PaxosError};

/// Persistence capability for an acceptor's promise/accept state.
///
/// `store` is awaited before the acceptor replies, so a successful return must mean
/// the state survives a restart of the process.
pub trait AcceptorStorage: Send + Sync + 'static {
    /// State left by a previous run, or `None` for a fresh acceptor.
    fn load(&self) -> impl Future<Output = Result<Option<AcceptorState>, PaxosError>> + Send;

    fn store(&self, state: &AcceptorState) -> impl Future<Output = Result<(), PaxosError>> + Send;
}

/// In-memory implementation of [`AcceptorStorage`].
///
/// Clones share the same slot, so an acceptor reopened over a clone sees the state the
/// previous instance stored.
#[derive(Clone, Default)]
pub struct InMemoryAcceptorStorage {
    state: Arc<RwLock<Option<AcceptorState>>>,
}

impl InMemoryAcceptorStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last stored state.
    pub async fn snapshot(&self) -> Option<AcceptorState> {
        self.state.read().await.clone()
    }
}

impl AcceptorStorage for InMemoryAcceptorStorage {
    async fn load(&self) -> Result<Option<AcceptorState>, PaxosError> {
        Ok(self.state.read().await.clone())
    }

    async fn store(&self, state: &AcceptorState) -> Result<(), PaxosError> {
        let mut slot = self.state.write().await;
        *slot = Some(state.clone());
        Ok(())
    }
}
