//! Proposer role: drives one value through prepare/promise and accept/accepted rounds
//! until a quorum of acceptors has accepted it.

use std::{future::Future, sync::Arc};

use parking_lot::Mutex;
use rand::{SeedableRng, rngs::StdRng};
use tokio::{
    sync::mpsc,
    time::{Instant, sleep, timeout_at},
};
use tracing::{debug, info, warn};

use crate::{
    config::ProposerConfig,
    error::{PaxosError, TransportError},
    events::{AbandonReason, BroadcastEventBus, PaxosEvent, PaxosEventBus},
    messages::{AcceptRequest, PrepareRequest, ProposalNumber},
    quorum::{PhaseDecision, QuorumTally, Vote},
    transport::Transport,
    types::{NodeAddress, NodeId, Phase, ProposalId, Value},
};

/// Result of a successful proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// The decided value; differs from the proposed one when another proposer's value
    /// was already on its way to being chosen.
    pub value: Value,
    /// Proposal id under which a quorum accepted `value`.
    pub proposal_id: ProposalId,
    /// Rounds used, including the successful one.
    pub attempts: u32,
}

/// Reply from one acceptor within a phase, tagged with the address it was sent to.
type PhaseReply<R> = (NodeAddress, Result<R, TransportError>);

enum PhaseOutcome {
    Decided,
    Abandoned(AbandonReason),
}

/// Proposer role of a node.
///
/// Every `propose` call runs its own rounds; concurrent calls on one proposer compete
/// only through the acceptors. Rounds are drawn from a counter shared by all calls so a
/// proposal id is never issued twice.
pub struct Proposer<T, E = BroadcastEventBus>
where
    T: Transport,
    E: PaxosEventBus,
{
    node_id: NodeId,
    acceptors: Arc<[NodeAddress]>,
    transport: Arc<T>,
    config: ProposerConfig,
    last_issued: Mutex<ProposalId>,
    event_bus: E,
}

impl<T, E> Proposer<T, E>
where
    T: Transport,
    E: PaxosEventBus,
{
    pub fn new(
        node_id: NodeId,
        acceptors: Vec<NodeAddress>,
        transport: Arc<T>,
        config: ProposerConfig,
        event_bus: E,
    ) -> Result<Self, PaxosError> {
        if acceptors.is_empty() {
            return Err(PaxosError::InvalidConfiguration(
                "proposer needs at least one acceptor".to_string(),
            ));
        }
        Ok(Self {
            node_id,
            acceptors: acceptors.into(),
            transport,
            config,
            last_issued: Mutex::new(ProposalId::new(0, node_id)),
            event_bus,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Drive `value` to consensus and return the value that was decided.
    pub async fn propose(&self, value: Value) -> Result<Value, PaxosError> {
        Ok(self.propose_detailed(value).await?.value)
    }

    /// Like [`Proposer::propose`], also reporting the winning proposal id and the number
    /// of rounds it took.
    ///
    /// Abandoned rounds are retried with a strictly higher proposal id after a jittered
    /// backoff. The only errors are exceeding `max_attempts` and running out of rounds.
    pub async fn propose_detailed(&self, value: Value) -> Result<Decision, PaxosError> {
        let mut candidate = value;
        let mut adopted: Option<ProposalId> = None;
        let mut highest_seen: Option<ProposalId> = None;
        let mut rng = StdRng::from_os_rng();
        let mut attempts: u32 = 0;

        loop {
            if let Some(max_attempts) = self.config.max_attempts()
                && attempts >= max_attempts
            {
                warn!(
                    "Proposer[{}] giving up after {attempts} attempts",
                    self.node_id
                );
                return Err(PaxosError::MaxAttemptsExceeded { attempts });
            }
            if attempts > 0 {
                sleep(self.config.backoff().duration(attempts - 1, &mut rng)).await;
            }
            attempts += 1;

            let proposal_id = self.next_proposal_id(highest_seen)?;
            debug!("Proposer[{}] starting round {proposal_id}", self.node_id);

            let mut prior: Option<(ProposalId, Value)> = None;
            match self
                .prepare_phase(proposal_id, &mut prior, &mut highest_seen)
                .await
            {
                PhaseOutcome::Decided => {}
                PhaseOutcome::Abandoned(reason) => {
                    self.abandon(proposal_id, Phase::Prepare, reason);
                    continue;
                }
            }

            if let Some((prior_id, prior_value)) = prior
                && adopted.is_none_or(|adopted| prior_id > adopted)
            {
                if prior_value != candidate {
                    info!(
                        "Proposer[{}] adopting value accepted at {prior_id} for round {proposal_id}",
                        self.node_id
                    );
                }
                candidate = prior_value;
                adopted = Some(prior_id);
            }

            match self
                .accept_phase(proposal_id, &candidate, &mut highest_seen)
                .await
            {
                PhaseOutcome::Decided => {
                    info!(
                        "Proposer[{}] value decided at {proposal_id} after {attempts} attempts",
                        self.node_id
                    );
                    self.event_bus.publish(PaxosEvent::ValueDecided {
                        node_id: self.node_id,
                        proposal_id,
                        value: candidate.clone(),
                    });
                    return Ok(Decision {
                        value: candidate,
                        proposal_id,
                        attempts,
                    });
                }
                PhaseOutcome::Abandoned(reason) => {
                    self.abandon(proposal_id, Phase::Accept, reason);
                }
            }
        }
    }

    /// Next proposal id, above both this node's last issued round and `highest_seen`.
    fn next_proposal_id(
        &self,
        highest_seen: Option<ProposalId>,
    ) -> Result<ProposalId, PaxosError> {
        let mut last_issued = self.last_issued.lock();
        let floor = highest_seen.map_or(*last_issued, |seen| seen.max(*last_issued));
        let next = floor
            .next(self.node_id)
            .ok_or(PaxosError::RoundsExhausted)?;
        *last_issued = next;
        Ok(next)
    }

    fn abandon(&self, proposal_id: ProposalId, phase: Phase, reason: AbandonReason) {
        warn!(
            "Proposer[{}] abandoned {phase} phase of {proposal_id}: {reason:?}",
            self.node_id
        );
        self.event_bus.publish(PaxosEvent::RoundAbandoned {
            node_id: self.node_id,
            proposal_id,
            phase,
            reason,
        });
    }

    /// Phase 1. On success `prior` holds the highest-numbered value already accepted by
    /// the promising quorum, if any.
    async fn prepare_phase(
        &self,
        proposal_id: ProposalId,
        prior: &mut Option<(ProposalId, Value)>,
        highest_seen: &mut Option<ProposalId>,
    ) -> PhaseOutcome {
        let request = PrepareRequest {
            proposal_id: Some(proposal_id.into()),
        };
        let replies = self.broadcast(move |transport, acceptor| {
            let request = request.clone();
            async move { transport.prepare(&acceptor, request).await }
        });

        self.collect(Phase::Prepare, proposal_id, replies, |acceptor, reply| {
            let reply = match reply {
                Ok(reply) => reply,
                Err(err) => {
                    debug!("prepare {proposal_id} to {acceptor} failed: {err}");
                    return Vote::Failed;
                }
            };
            if !matches_request(proposal_id, acceptor, reply.proposal_id, &reply.acceptor_address)
            {
                return Vote::Failed;
            }
            if !reply.granted {
                note_promised(highest_seen, reply.promised_id);
                return Vote::Rejected;
            }

            if let Some(value) = reply.prior_accepted_value {
                match ProposalId::try_from(reply.prior_accepted_id) {
                    Ok(prior_id) if prior.as_ref().is_none_or(|(best, _)| prior_id > *best) => {
                        *prior = Some((prior_id, value));
                    }
                    Ok(_) => {}
                    // A grant that hides the id of its accepted value cannot be trusted.
                    Err(_) => return Vote::Failed,
                }
            }
            Vote::Granted
        })
        .await
    }

    /// Phase 2.
    async fn accept_phase(
        &self,
        proposal_id: ProposalId,
        value: &Value,
        highest_seen: &mut Option<ProposalId>,
    ) -> PhaseOutcome {
        let request = AcceptRequest {
            proposal_id: Some(proposal_id.into()),
            value: value.clone(),
        };
        let replies = self.broadcast(move |transport, acceptor| {
            let request = request.clone();
            async move { transport.accept(&acceptor, request).await }
        });

        self.collect(Phase::Accept, proposal_id, replies, |acceptor, reply| {
            let reply = match reply {
                Ok(reply) => reply,
                Err(err) => {
                    debug!("accept {proposal_id} to {acceptor} failed: {err}");
                    return Vote::Failed;
                }
            };
            if !matches_request(proposal_id, acceptor, reply.proposal_id, &reply.acceptor_address)
            {
                return Vote::Failed;
            }
            if reply.granted {
                Vote::Granted
            } else {
                note_promised(highest_seen, reply.promised_id);
                Vote::Rejected
            }
        })
        .await
    }

    /// Issue one call per acceptor as an independent task. Replies arrive on the
    /// returned channel; once it is dropped, late replies are discarded.
    fn broadcast<R, F, Fut>(&self, mut call: F) -> mpsc::Receiver<PhaseReply<R>>
    where
        R: Send + 'static,
        F: FnMut(Arc<T>, NodeAddress) -> Fut,
        Fut: Future<Output = Result<R, TransportError>> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(self.acceptors.len());
        for acceptor in self.acceptors.iter() {
            let pending = call(Arc::clone(&self.transport), acceptor.clone());
            let sender = sender.clone();
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let reply = pending.await;
                let _ = sender.send((acceptor, reply)).await;
            });
        }
        receiver
    }

    /// Consume replies until the tally decides or the phase timer fires.
    async fn collect<R, F>(
        &self,
        phase: Phase,
        proposal_id: ProposalId,
        mut replies: mpsc::Receiver<PhaseReply<R>>,
        mut classify: F,
    ) -> PhaseOutcome
    where
        F: FnMut(&NodeAddress, Result<R, TransportError>) -> Vote,
    {
        let deadline = Instant::now() + self.config.phase_timeout();
        let mut tally = QuorumTally::new(self.acceptors.len());

        loop {
            let (acceptor, reply) = match timeout_at(deadline, replies.recv()).await {
                Ok(Some(reply)) => reply,
                // Every task reported without a decision; cannot happen with a full tally.
                Ok(None) => return PhaseOutcome::Abandoned(AbandonReason::QuorumImpossible),
                Err(_) => {
                    debug!(
                        "{phase} {proposal_id} timed out with {}/{} grants",
                        tally.granted(),
                        tally.quorum()
                    );
                    return PhaseOutcome::Abandoned(AbandonReason::TimedOut);
                }
            };

            match tally.record(classify(&acceptor, reply)) {
                Some(PhaseDecision::QuorumReached) => return PhaseOutcome::Decided,
                Some(PhaseDecision::QuorumImpossible) => {
                    debug!(
                        "{phase} {proposal_id} lost: {} rejected, {} failed",
                        tally.rejected(),
                        tally.failed()
                    );
                    return PhaseOutcome::Abandoned(AbandonReason::QuorumImpossible);
                }
                None => {}
            }
        }
    }
}

/// A reply counts only if it answers this proposal id and comes from the acceptor the
/// request was sent to.
fn matches_request(
    proposal_id: ProposalId,
    acceptor: &NodeAddress,
    reply_id: Option<ProposalNumber>,
    reply_acceptor: &str,
) -> bool {
    let matches = reply_id == Some(proposal_id.into()) && reply_acceptor == acceptor.as_str();
    if !matches {
        debug!(
            "discarding mismatched reply from {acceptor}: {reply_id:?} from {reply_acceptor:?}"
        );
    }
    matches
}

fn note_promised(highest_seen: &mut Option<ProposalId>, promised: Option<ProposalNumber>) {
    if let Ok(promised) = ProposalId::try_from(promised)
        && highest_seen.is_none_or(|seen| promised > seen)
    {
        *highest_seen = Some(promised);
    }
}
