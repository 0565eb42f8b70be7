//! Wire messages for the remote operations exposed by acceptors and learners.
//!
//! Every message is a protobuf message, so any byte-oriented transport can carry it.

use std::fmt;

/// Wire form of a [`crate::types::ProposalId`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, ::prost::Message)]
pub struct ProposalNumber {
    #[prost(uint64, tag = "1")]
    pub round: u64,
    #[prost(uint64, tag = "2")]
    pub node_id: u64,
}

/// Phase 1 request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PrepareRequest {
    #[prost(message, optional, tag = "1")]
    pub proposal_id: Option<ProposalNumber>,
}

/// Phase 1 reply.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PromiseReply {
    /// Echo of the request's proposal id.
    #[prost(message, optional, tag = "1")]
    pub proposal_id: Option<ProposalNumber>,
    #[prost(string, tag = "2")]
    pub acceptor_address: String,
    #[prost(bool, tag = "3")]
    pub granted: bool,
    /// Proposal id of the value the acceptor already holds, attached on grants.
    #[prost(message, optional, tag = "4")]
    pub prior_accepted_id: Option<ProposalNumber>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub prior_accepted_value: Option<Vec<u8>>,
    /// Highest proposal id the acceptor has promised, attached on rejections.
    #[prost(message, optional, tag = "6")]
    pub promised_id: Option<ProposalNumber>,
}

/// Phase 2 request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AcceptRequest {
    #[prost(message, optional, tag = "1")]
    pub proposal_id: Option<ProposalNumber>,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

/// Phase 2 reply.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AcceptedReply {
    #[prost(message, optional, tag = "1")]
    pub proposal_id: Option<ProposalNumber>,
    #[prost(string, tag = "2")]
    pub acceptor_address: String,
    #[prost(bool, tag = "3")]
    pub granted: bool,
    #[prost(message, optional, tag = "4")]
    pub promised_id: Option<ProposalNumber>,
}

/// Sent by an acceptor to every learner after it accepts a value.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChosenNotice {
    #[prost(message, optional, tag = "1")]
    pub proposal_id: Option<ProposalNumber>,
    #[prost(string, tag = "2")]
    pub acceptor_address: String,
    /// Size of the acceptor set the notifying acceptor belongs to.
    #[prost(uint32, tag = "3")]
    pub acceptor_count: u32,
    #[prost(bytes = "vec", tag = "4")]
    pub value: Vec<u8>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Ack {}

/// Remote operations a node serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Prepare,
    Accept,
    ReceiveChosen,
}

impl Operation {
    pub const fn name(self) -> &'static str {
        match self {
            Operation::Prepare => "Acceptor.Prepare",
            Operation::Accept => "Acceptor.Accept",
            Operation::ReceiveChosen => "Learner.ReceiveChosen",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Acceptor.Prepare" => Some(Operation::Prepare),
            "Acceptor.Accept" => Some(Operation::Accept),
            "Learner.ReceiveChosen" => Some(Operation::ReceiveChosen),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
