//! The connection manager resolves, for each round, the five peers this node
//! talks to: the issuer it requests the round's proposal from, and the four
//! consumers it forwards transactions to.
//!
//! The four consumers cover the four combinations of the next two round
//! transitions (reject/commit x reject/commit): whichever future round
//! materializes, some peer already holds the transactions to propose. Each
//! transition distance uses the permutation seeded by the block hash of the
//! matching age, so all honest nodes resolve the same peers from the same
//! three most recent hashes.

use crate::client::{ClientRequest, ClientResponse};
use crate::colored::Colorize;
use crate::ledger::{BlockHash, Peer, SyncOutcome, SynchronizationEvent};
use crate::permutation::seeded_permutation;
use crate::protocol::{Request, Response};
use crate::round::{
    current_reject_round_consumer, next_commit_round, next_reject_round, Round,
    NEXT_COMMIT_CONSUMER, NEXT_REJECT_CONSUMER,
};

use super::service::{GetProposal, ProposalReply, PushBatches};
use super::{Error, Result};

use tracing::{debug, error, warn};

use actix::{Actor, Context, Handler, Recipient, ResponseFuture};
use actix_derive::Message;

use std::collections::VecDeque;
use std::time::Duration;

/// Hashes consulted per event: current round, next round, round after next.
const HASH_WINDOW: usize = 3;

/// The five role-tagged peers of one round, replaced wholesale on every
/// synchronization event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentPeers {
    /// Serves the proposal for the current round.
    pub issuer: Peer,
    /// Assembles for (block_round, reject_round + 1).
    pub reject_reject: Peer,
    /// Assembles for (block_round + 1, 1).
    pub commit_reject: Peer,
    /// Assembles for (block_round + 1, 0).
    pub reject_commit: Peer,
    /// Assembles for (block_round + 2, 0).
    pub commit_commit: Peer,
}

impl CurrentPeers {
    pub fn consumers(&self) -> Vec<&Peer> {
        vec![&self.reject_reject, &self.commit_reject, &self.reject_commit, &self.commit_commit]
    }
}

/// The round a synchronization outcome leads into.
pub fn advanced_round(event: &SynchronizationEvent) -> Round {
    match event.sync_outcome {
        SyncOutcome::Commit => next_commit_round(event.round),
        SyncOutcome::Reject | SyncOutcome::Nothing => next_reject_round(event.round),
    }
}

/// Derives the role assignment for `current` from the peer list and the
/// three most recent block hashes, oldest first.
pub fn role_assignment(current: Round, peers: &[Peer], hashes: [&BlockHash; HASH_WINDOW]) -> CurrentPeers {
    let n = peers.len();
    let permutations: Vec<Vec<usize>> =
        hashes.iter().map(|hash| seeded_permutation(hash, n)).collect();

    // reject rounds are unbounded while the permutation indexes [0, n)
    let os_peer = |transition: usize, reject_round: u32| -> Peer {
        let permutation = &permutations[transition];
        peers[permutation[reject_round as usize % n]].clone()
    };

    CurrentPeers {
        issuer: os_peer(0, current.reject_round),
        reject_reject: os_peer(0, current_reject_round_consumer(current.reject_round)),
        reject_commit: os_peer(1, NEXT_COMMIT_CONSUMER),
        commit_reject: os_peer(1, NEXT_REJECT_CONSUMER),
        commit_commit: os_peer(2, NEXT_COMMIT_CONSUMER),
    }
}

struct Binding {
    round: Round,
    peers: CurrentPeers,
}

pub struct ConnectionManager {
    /// The client used to make external requests.
    sender: Recipient<ClientRequest>,
    /// Timeout for the proposal request to the issuer.
    proposal_request_timeout: Duration,
    /// The most recent committed-block hashes, oldest first. Primed with the
    /// two configured initial hashes; role assignment starts once the first
    /// real commit fills the third slot.
    hash_window: VecDeque<BlockHash>,
    binding: Option<Binding>,
}

impl ConnectionManager {
    pub fn new(
        sender: Recipient<ClientRequest>,
        initial_hashes: [BlockHash; 2],
        proposal_request_timeout: Duration,
    ) -> Self {
        let mut hash_window = VecDeque::with_capacity(HASH_WINDOW + 1);
        hash_window.push_back(initial_hashes[0]);
        hash_window.push_back(initial_hashes[1]);
        ConnectionManager {
            sender,
            proposal_request_timeout,
            hash_window,
            binding: None,
        }
    }

    fn compute_binding(&self, event: &SynchronizationEvent) -> Result<Binding> {
        if self.hash_window.len() < HASH_WINDOW {
            return Err(Error::WindowNotPrimed);
        }
        let peers = &event.ledger_state.ledger_peers;
        if peers.is_empty() {
            return Err(Error::EmptyLedgerPeers);
        }
        if peers.len() < 5 {
            warn!(
                "[{}] only {} ledger peers; roles will collapse onto shared peers",
                "conn".green(),
                peers.len()
            );
        }
        let round = advanced_round(event);
        let hashes = [&self.hash_window[0], &self.hash_window[1], &self.hash_window[2]];
        for hash in hashes.iter() {
            debug!("[{}] using hash: {}", "conn".green(), hash);
        }
        let peers = role_assignment(round, peers, hashes);
        debug!("[{}] issuer for {} is {}", "conn".green(), round, peers.issuer);
        Ok(Binding { round, peers })
    }
}

impl Actor for ConnectionManager {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!(": started");
    }
}

/// A block committed; its hash slides into the window.
#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "()")]
pub struct BlockCommitted {
    pub hash: BlockHash,
}

impl Handler<BlockCommitted> for ConnectionManager {
    type Result = ();

    fn handle(&mut self, msg: BlockCommitted, _ctx: &mut Context<Self>) -> Self::Result {
        self.hash_window.push_back(msg.hash);
        while self.hash_window.len() > HASH_WINDOW {
            self.hash_window.pop_front();
        }
    }
}

/// A synchronization event; the role binding is recomputed from scratch.
#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "()")]
pub struct PeersUpdate {
    pub event: SynchronizationEvent,
}

impl Handler<PeersUpdate> for ConnectionManager {
    type Result = ();

    fn handle(&mut self, msg: PeersUpdate, _ctx: &mut Context<Self>) -> Self::Result {
        match self.compute_binding(&msg.event) {
            Ok(binding) => self.binding = Some(binding),
            Err(err) => {
                error!("[{}] refusing role binding: {}", "conn".green(), err);
                self.binding = None;
            }
        }
    }
}

/// Requests the proposal for `round` from the round's issuer.
#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "ProposalReply")]
pub struct RequestProposal {
    pub round: Round,
}

impl Handler<RequestProposal> for ConnectionManager {
    type Result = ResponseFuture<ProposalReply>;

    fn handle(&mut self, msg: RequestProposal, _ctx: &mut Context<Self>) -> Self::Result {
        let issuer = match &self.binding {
            Some(binding) if binding.round == msg.round => binding.peers.issuer.clone(),
            _ => {
                warn!("[{}] no issuer binding for {}", "conn".green(), msg.round);
                return Box::pin(async { ProposalReply { proposal: None } });
            }
        };
        let sender = self.sender.clone();
        let timeout = self.proposal_request_timeout;
        let round = msg.round;
        Box::pin(async move {
            let request = ClientRequest::Oneshot {
                peer: issuer,
                request: Request::GetProposal(GetProposal { round }),
                timeout,
            };
            match sender.send(request).await {
                Ok(ClientResponse::Oneshot(Some(Response::Proposal(reply)))) => reply,
                Ok(ClientResponse::Oneshot(_)) => ProposalReply { proposal: None },
                Ok(other) => {
                    error!("[{}] unexpected client response: {:?}", "conn".green(), other);
                    ProposalReply { proposal: None }
                }
                Err(err) => {
                    error!("[{}] client unreachable: {}", "conn".green(), err);
                    ProposalReply { proposal: None }
                }
            }
        })
    }
}

/// Forwards batches to the four consumers of the current binding.
#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "()")]
pub struct ForwardBatches {
    pub batches: Vec<crate::tx::TransactionBatch>,
}

impl Handler<ForwardBatches> for ConnectionManager {
    type Result = ();

    fn handle(&mut self, msg: ForwardBatches, _ctx: &mut Context<Self>) -> Self::Result {
        let binding = match &self.binding {
            Some(binding) => binding,
            None => {
                debug!("[{}] no binding; dropping batch forward", "conn".green());
                return;
            }
        };
        for consumer in binding.peers.consumers() {
            let _ = self.sender.do_send(ClientRequest::Notify {
                peer: consumer.clone(),
                request: Request::PushBatches(PushBatches { batches: msg.batches.clone() }),
            });
        }
    }
}
