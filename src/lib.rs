//! Single-value Paxos consensus.
//!
//! A cluster agrees on one value. Every node plays three roles:
//!
//! - a [`proposer::Proposer`] drives a caller's value through a prepare/promise round and
//!   an accept/accepted round against every acceptor, retrying with higher proposal ids
//!   until a majority accepts. If it discovers a value some acceptors already accepted,
//!   it proposes that value instead of its own.
//! - an [`acceptor::Acceptor`] promises and accepts proposals, persists its decisions
//!   through an [`storage::AcceptorStorage`] before replying, and tells every learner
//!   what it accepted.
//! - a [`learner::Learner`] records the value once a majority of acceptors report it and
//!   flags any conflicting report as a consistency fault.
//!
//! [`node::Node`] composes the three roles and serves them through any
//! [`transport::Transport`]; [`transport::InMemoryTransport`] runs a whole cluster in one
//! process and can simulate partitions, message loss and latency.

pub mod acceptor;
pub mod config;
pub mod error;
pub mod events;
pub mod learner;
pub mod messages;
pub mod node;
pub mod proposer;
pub mod quorum;
pub mod storage;
pub mod transport;
pub mod types;
