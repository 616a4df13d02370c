//! The ordering gate: the round state machine of the local node.
//!
//! Synchronization events drive the round forward. On each event the gate
//! advances the ordering service, refreshes the connection manager's role
//! binding, re-forwards the pending batches to the new consumers and
//! requests the round's proposal from the issuer. The downstream stream
//! never errors: when no proposal can be obtained the gate emits an empty
//! one so consensus can reject and advance the reject round.

use crate::colored::Colorize;
use crate::ledger::{Block, SynchronizationEvent};
use crate::proposal::{Proposal, ProposalFactory};
use crate::round::Round;
use crate::tx::TransactionBatch;
use crate::tx_cache::TxPresenceCache;
use crate::util;

use super::cache::BatchCache;
use super::connection::{advanced_round, BlockCommitted, ConnectionManager, ForwardBatches, PeersUpdate, RequestProposal};
use super::service::{OrderingService, ProposalReply, RoundAdvance, TxsFinalized};

use tracing::{debug, error, info, warn};

use actix::{Actor, ActorFutureExt, Addr, AsyncContext, Context, Handler, Recipient, WrapFuture};
use actix_derive::Message;

use std::sync::Arc;

/// Proposal emitted downstream once a round is resolved.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct RoundProposal {
    pub round: Round,
    pub proposal: Proposal,
}

/// External batch ingress.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct PropagateBatch {
    pub batch: TransactionBatch,
}

/// A block the synchronizer committed.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct CommitBlock {
    pub block: Block,
}

/// A resolved round from the synchronizer.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct SyncUpdate {
    pub event: SynchronizationEvent,
}

pub struct OrderingGate {
    service: Addr<OrderingService>,
    connection: Addr<ConnectionManager>,
    tx_cache: Arc<dyn TxPresenceCache>,
    proposal_factory: Arc<dyn ProposalFactory>,
    downstream: Recipient<RoundProposal>,
    batch_cache: BatchCache,
    current_round: Option<Round>,
}

impl OrderingGate {
    pub fn new(
        service: Addr<OrderingService>,
        connection: Addr<ConnectionManager>,
        tx_cache: Arc<dyn TxPresenceCache>,
        proposal_factory: Arc<dyn ProposalFactory>,
        downstream: Recipient<RoundProposal>,
    ) -> Self {
        OrderingGate {
            service,
            connection,
            tx_cache,
            proposal_factory,
            downstream,
            batch_cache: BatchCache::new(),
            current_round: None,
        }
    }

    /// Turns whatever the issuer answered into the proposal emitted for
    /// `round`: wrong-round and absent proposals become empty ones, and
    /// transactions the ledger already resolved are dropped.
    fn finalize_proposal(&self, round: Round, proposal: Option<Proposal>) -> Proposal {
        let proposal = proposal.filter(|proposal| {
            if proposal.round != round {
                warn!(
                    "[{}] issuer answered with proposal for {} instead of {}",
                    "gate".cyan(),
                    proposal.round,
                    round
                );
                return false;
            }
            true
        });
        match proposal {
            Some(proposal) => {
                let before = proposal.transactions.len();
                let transactions: Vec<_> = proposal
                    .transactions
                    .into_iter()
                    .filter(|tx| !self.tx_cache.check(&tx.hash()).is_final())
                    .collect();
                if transactions.len() < before {
                    info!(
                        "[{}] dropped {} already-resolved transactions from {}",
                        "gate".cyan(),
                        before - transactions.len(),
                        round
                    );
                }
                self.proposal_factory.create(round, transactions, proposal.created_time)
            }
            None => self.proposal_factory.create(round, vec![], util::now_millis()),
        }
    }
}

impl Actor for OrderingGate {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!(": started");
    }
}

impl Handler<SyncUpdate> for OrderingGate {
    type Result = ();

    fn handle(&mut self, msg: SyncUpdate, ctx: &mut Context<Self>) -> Self::Result {
        let event = msg.event;
        let next = advanced_round(&event);
        debug!("[{}] sync event on {} => {}", "gate".cyan(), event.round, next);

        if let Some(current) = self.current_round {
            if next <= current {
                warn!(
                    "[{}] ignoring non-monotonic round switch {} (current {})",
                    "gate".cyan(),
                    next,
                    current
                );
                return;
            }
        }
        self.current_round = Some(next);
        self.service.do_send(RoundAdvance { round: next });

        let connection = self.connection.clone();
        let pending = self.batch_cache.pending();
        let request = async move {
            // the role binding must be in place before anything is sent for
            // this round
            if let Err(err) = connection.send(PeersUpdate { event }).await {
                error!("[{}] connection manager unreachable: {}", "gate".cyan(), err);
                return ProposalReply { proposal: None };
            }
            if !pending.is_empty() {
                connection.do_send(ForwardBatches { batches: pending });
            }
            match connection.send(RequestProposal { round: next }).await {
                Ok(reply) => reply,
                Err(err) => {
                    error!("[{}] connection manager unreachable: {}", "gate".cyan(), err);
                    ProposalReply { proposal: None }
                }
            }
        };

        ctx.spawn(request.into_actor(self).map(move |reply, act, _ctx| {
            // a newer event supersedes this round; late answers are dropped
            if act.current_round != Some(next) {
                debug!("[{}] discarding proposal for superseded {}", "gate".cyan(), next);
                return;
            }
            let proposal = act.finalize_proposal(next, reply.proposal);
            info!(
                "[{}] round {} ready with {} transactions",
                "gate".cyan(),
                next,
                proposal.transactions.len()
            );
            let _ = act.downstream.do_send(RoundProposal { round: next, proposal });
        }));
    }
}

impl Handler<CommitBlock> for OrderingGate {
    type Result = ();

    fn handle(&mut self, msg: CommitBlock, _ctx: &mut Context<Self>) -> Self::Result {
        debug!("[{}] committed block handle: height {}", "gate".cyan(), msg.block.height);
        let finalized = msg.block.finalized_hashes();
        let evicted = self.batch_cache.evict(&finalized);
        if evicted > 0 {
            debug!("[{}] evicted {} pending batches", "gate".cyan(), evicted);
        }
        self.service.do_send(TxsFinalized { hashes: finalized });
        self.connection.do_send(BlockCommitted { hash: msg.block.hash });
    }
}

impl Handler<PropagateBatch> for OrderingGate {
    type Result = ();

    fn handle(&mut self, msg: PropagateBatch, _ctx: &mut Context<Self>) -> Self::Result {
        if !self.batch_cache.insert(msg.batch.clone()) {
            debug!("[{}] batch {} already pending", "gate".cyan(), msg.batch.reduced_hash());
        }
        self.connection.do_send(ForwardBatches { batches: vec![msg.batch] });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientRequest, ClientResponse};
    use crate::ledger::{BlockHash, LedgerState, Peer, PublicKey, SyncOutcome};
    use crate::ordering::AlwaysCreateStrategy;
    use crate::proposal::UncheckedProposalFactory;
    use crate::protocol::{Request, Response};
    use crate::round::Round;
    use crate::tx::{Transaction, TxHash};
    use crate::tx_cache::MemoryTxCache;

    use actix::Addr;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct RecordingDownstream {
        emitted: Arc<Mutex<Vec<RoundProposal>>>,
    }

    impl Actor for RecordingDownstream {
        type Context = Context<Self>;
    }

    impl Handler<RoundProposal> for RecordingDownstream {
        type Result = ();

        fn handle(&mut self, msg: RoundProposal, _ctx: &mut Context<Self>) -> Self::Result {
            self.emitted.lock().unwrap().push(msg);
        }
    }

    /// Answers proposal requests per round from a script; records all
    /// outbound traffic.
    struct ScriptedClient {
        requests: Arc<Mutex<Vec<ClientRequest>>>,
        proposals: HashMap<Round, Proposal>,
    }

    impl Actor for ScriptedClient {
        type Context = Context<Self>;
    }

    impl Handler<ClientRequest> for ScriptedClient {
        type Result = ClientResponse;

        fn handle(&mut self, msg: ClientRequest, _ctx: &mut Context<Self>) -> Self::Result {
            self.requests.lock().unwrap().push(msg.clone());
            match msg {
                ClientRequest::Oneshot { request: Request::GetProposal(get), .. } => {
                    ClientResponse::Oneshot(Some(Response::Proposal(ProposalReply {
                        proposal: self.proposals.get(&get.round).cloned(),
                    })))
                }
                ClientRequest::Oneshot { .. } => ClientResponse::Oneshot(None),
                ClientRequest::Fanout { .. } => ClientResponse::Fanout(vec![]),
                ClientRequest::Notify { .. } => ClientResponse::Notified,
            }
        }
    }

    struct Harness {
        gate: Addr<OrderingGate>,
        emitted: Arc<Mutex<Vec<RoundProposal>>>,
        requests: Arc<Mutex<Vec<ClientRequest>>>,
        tx_cache: Arc<MemoryTxCache>,
        peers: Vec<Peer>,
    }

    fn hash(byte: u8) -> BlockHash {
        BlockHash::new([byte; 32])
    }

    fn harness(proposals: HashMap<Round, Proposal>) -> Harness {
        let requests = Arc::new(Mutex::new(vec![]));
        let client = ScriptedClient { requests: requests.clone(), proposals }.start();

        let tx_cache = Arc::new(MemoryTxCache::new());
        let factory = Arc::new(UncheckedProposalFactory);

        let service = OrderingService::new(
            10,
            factory.clone(),
            tx_cache.clone(),
            Box::new(AlwaysCreateStrategy),
            Round::new(1, 0),
        )
        .start();

        let connection = ConnectionManager::new(
            client.recipient(),
            [hash(0xaa), hash(0xbb)],
            Duration::from_millis(500),
        )
        .start();

        let emitted = Arc::new(Mutex::new(vec![]));
        let downstream = RecordingDownstream { emitted: emitted.clone() }.start();

        let gate = OrderingGate::new(
            service,
            connection,
            tx_cache.clone(),
            factory,
            downstream.recipient(),
        )
        .start();

        let peers: Vec<Peer> = (0..5)
            .map(|i| {
                Peer::new(
                    format!("127.0.0.1:{}", 7100 + i).parse().unwrap(),
                    PublicKey([i as u8; 32]),
                )
            })
            .collect();

        Harness { gate, emitted, requests, tx_cache, peers }
    }

    fn block(height: u64, hash_byte: u8) -> Block {
        Block {
            height,
            hash: hash(hash_byte),
            transactions: vec![],
            rejected_transactions_hashes: vec![],
        }
    }

    fn sync_event(
        harness: &Harness,
        round: Round,
        outcome: SyncOutcome,
    ) -> SynchronizationEvent {
        SynchronizationEvent {
            round,
            sync_outcome: outcome,
            ledger_state: LedgerState::new(harness.peers.clone(), round.block_round),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[actix_rt::test]
    async fn test_commit_emits_next_block_round() {
        let harness = harness(HashMap::new());
        harness.gate.send(CommitBlock { block: block(10, 0xcc) }).await.unwrap();
        harness
            .gate
            .send(SyncUpdate { event: sync_event(&harness, Round::new(10, 0), SyncOutcome::Commit) })
            .await
            .unwrap();

        settle().await;
        let emitted = harness.emitted.lock().unwrap();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].round, Round::new(11, 0));
        assert!(emitted[0].proposal.is_empty());
    }

    #[actix_rt::test]
    async fn test_reject_and_nothing_advance_reject_round() {
        let harness = harness(HashMap::new());
        harness.gate.send(CommitBlock { block: block(10, 0xcc) }).await.unwrap();
        harness
            .gate
            .send(SyncUpdate { event: sync_event(&harness, Round::new(10, 3), SyncOutcome::Reject) })
            .await
            .unwrap();
        settle().await;
        harness
            .gate
            .send(SyncUpdate {
                event: sync_event(&harness, Round::new(10, 4), SyncOutcome::Nothing),
            })
            .await
            .unwrap();
        settle().await;
        let emitted = harness.emitted.lock().unwrap();
        let rounds: Vec<Round> = emitted.iter().map(|e| e.round).collect();
        assert_eq!(rounds, vec![Round::new(10, 4), Round::new(10, 5)]);
    }

    #[actix_rt::test]
    async fn test_emitted_rounds_are_strictly_increasing() {
        let harness = harness(HashMap::new());
        harness.gate.send(CommitBlock { block: block(10, 0xcc) }).await.unwrap();

        for (round, outcome) in [
            (Round::new(10, 0), SyncOutcome::Commit),
            (Round::new(11, 0), SyncOutcome::Reject),
            // a replay of an already-resolved round must be ignored
            (Round::new(10, 0), SyncOutcome::Commit),
            (Round::new(11, 1), SyncOutcome::Reject),
        ]
        .iter()
        .cloned()
        {
            harness
                .gate
                .send(SyncUpdate { event: sync_event(&harness, round, outcome) })
                .await
                .unwrap();
            settle().await;
        }
        let emitted = harness.emitted.lock().unwrap();
        let rounds: Vec<Round> = emitted.iter().map(|e| e.round).collect();
        assert_eq!(rounds, vec![Round::new(11, 0), Round::new(11, 1), Round::new(11, 2)]);
        for pair in rounds.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[actix_rt::test]
    async fn test_resolved_transactions_are_filtered_out() {
        let factory = UncheckedProposalFactory;
        let t1 = Transaction::new(b"t1".to_vec(), 1);
        let t2 = Transaction::new(b"t2".to_vec(), 2);
        let t3 = Transaction::new(b"t3".to_vec(), 3);
        let round = Round::new(11, 0);
        let mut proposals = HashMap::new();
        proposals
            .insert(round, factory.create(round, vec![t1.clone(), t2.clone(), t3.clone()], 5));

        let harness = harness(proposals);
        harness.tx_cache.mark_committed(t1.hash());

        harness.gate.send(CommitBlock { block: block(10, 0xcc) }).await.unwrap();
        harness
            .gate
            .send(SyncUpdate { event: sync_event(&harness, Round::new(10, 0), SyncOutcome::Commit) })
            .await
            .unwrap();

        settle().await;
        let emitted = harness.emitted.lock().unwrap();
        assert_eq!(emitted.len(), 1);
        let hashes: Vec<TxHash> =
            emitted[0].proposal.transactions.iter().map(|tx| tx.hash()).collect();
        assert_eq!(hashes, vec![t2.hash(), t3.hash()]);
    }

    #[actix_rt::test]
    async fn test_unprimed_window_still_emits_empty() {
        let harness = harness(HashMap::new());
        // no committed block: the hash window holds only the two initial
        // hashes and no issuer can be resolved
        harness
            .gate
            .send(SyncUpdate { event: sync_event(&harness, Round::new(10, 0), SyncOutcome::Commit) })
            .await
            .unwrap();

        settle().await;
        let emitted = harness.emitted.lock().unwrap();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].round, Round::new(11, 0));
        assert!(emitted[0].proposal.is_empty());
        assert!(harness.requests.lock().unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn test_propagated_batches_reach_the_consumers() {
        let harness = harness(HashMap::new());
        harness.gate.send(CommitBlock { block: block(10, 0xcc) }).await.unwrap();
        harness
            .gate
            .send(SyncUpdate { event: sync_event(&harness, Round::new(10, 0), SyncOutcome::Commit) })
            .await
            .unwrap();
        settle().await;

        let batch = TransactionBatch::new(vec![Transaction::new(b"tx".to_vec(), 1)]);
        harness.gate.send(PropagateBatch { batch }).await.unwrap();
        settle().await;

        let pushes = harness
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| {
                matches!(request, ClientRequest::Notify { request: Request::PushBatches(_), .. })
            })
            .count();
        assert_eq!(pushes, 4);
    }

    #[actix_rt::test]
    async fn test_pending_batches_are_reforwarded_on_round_switch() {
        let harness = harness(HashMap::new());
        harness.gate.send(CommitBlock { block: block(10, 0xcc) }).await.unwrap();
        harness
            .gate
            .send(SyncUpdate { event: sync_event(&harness, Round::new(10, 0), SyncOutcome::Commit) })
            .await
            .unwrap();
        settle().await;

        let batch = TransactionBatch::new(vec![Transaction::new(b"tx".to_vec(), 1)]);
        harness.gate.send(PropagateBatch { batch }).await.unwrap();
        settle().await;
        let after_propagate = harness.requests.lock().unwrap().len();

        harness
            .gate
            .send(SyncUpdate { event: sync_event(&harness, Round::new(11, 0), SyncOutcome::Reject) })
            .await
            .unwrap();
        settle().await;

        let requests = harness.requests.lock().unwrap();
        let reforwarded = requests[after_propagate..]
            .iter()
            .filter(|request| {
                matches!(request, ClientRequest::Notify { request: Request::PushBatches(_), .. })
            })
            .count();
        assert_eq!(reforwarded, 4);
    }

    #[actix_rt::test]
    async fn test_committed_batch_is_not_reforwarded() {
        let harness = harness(HashMap::new());
        harness.gate.send(CommitBlock { block: block(10, 0xcc) }).await.unwrap();
        harness
            .gate
            .send(SyncUpdate { event: sync_event(&harness, Round::new(10, 0), SyncOutcome::Commit) })
            .await
            .unwrap();
        settle().await;

        let tx = Transaction::new(b"tx".to_vec(), 1);
        let batch = TransactionBatch::new(vec![tx.clone()]);
        harness.gate.send(PropagateBatch { batch }).await.unwrap();
        settle().await;

        // the transaction commits; its batch must leave the pending cache
        let committed = Block {
            height: 11,
            hash: hash(0xdd),
            transactions: vec![tx],
            rejected_transactions_hashes: vec![],
        };
        harness.gate.send(CommitBlock { block: committed }).await.unwrap();
        let after_commit = harness.requests.lock().unwrap().len();

        harness
            .gate
            .send(SyncUpdate { event: sync_event(&harness, Round::new(11, 0), SyncOutcome::Commit) })
            .await
            .unwrap();
        settle().await;

        let requests = harness.requests.lock().unwrap();
        let reforwarded = requests[after_commit..]
            .iter()
            .filter(|request| {
                matches!(request, ClientRequest::Notify { request: Request::PushBatches(_), .. })
            })
            .count();
        assert_eq!(reforwarded, 0);
    }
}
