use crate::{learner::ConsistencyFault, types::NodeAddress};

#[derive(Debug, thiserror::Error)]
pub enum PaxosError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Consistency fault: {0}")]
    ConsistencyFault(Box<ConsistencyFault>),

    #[error("Proposal abandoned after {attempts} attempts")]
    MaxAttemptsExceeded { attempts: u32 },
    #[error("Proposal round numbers exhausted")]
    RoundsExhausted,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Failure of a single remote call. The proposer counts any of these as a failed vote.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Node {0} is unreachable")]
    Unreachable(NodeAddress),
    #[error("No node registered at {0}")]
    UnknownNode(NodeAddress),
    #[error("Message to {0} was lost")]
    MessageLost(NodeAddress),
    #[error("Failed to decode message: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("Remote handler failed: {0}")]
    Remote(String),
}
