//! The per-node on-demand ordering service.
//!
//! Admits transaction batches pushed by peers, and answers proposal requests
//! for the rounds it is issuer or consumer of. Proposals are assembled once
//! per round and cached for the lifetime of that round; requests for evicted
//! rounds answer empty.

use crate::colored::Colorize;
use crate::proposal::{Proposal, ProposalFactory};
use crate::round::Round;
use crate::tx::{Transaction, TransactionBatch, TxHash};
use crate::tx_cache::TxPresenceCache;
use crate::util;

use super::strategy::CreationStrategy;

use tracing::{debug, info, warn};

use actix::{Actor, Context, Handler};
use actix_derive::{Message, MessageResponse};

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

/// Rounds the service will assemble ahead of its current round. Requests
/// farther into the future answer empty.
const MAX_ROUNDS_AHEAD: u64 = 2;

struct AdmittedBatch {
    admitted_at: u64,
    batch: TransactionBatch,
}

pub struct OrderingService {
    /// Proposal size cap.
    transaction_limit: usize,
    proposal_factory: Arc<dyn ProposalFactory>,
    /// Presence lookups for duplicate suppression.
    tx_cache: Arc<dyn TxPresenceCache>,
    creation_strategy: Box<dyn CreationStrategy>,
    /// Admission-ordered queue of batches not yet finalized.
    batches: VecDeque<AdmittedBatch>,
    /// Reduced hashes of the queued batches.
    queued: HashSet<TxHash>,
    /// Decisions taken per round; `None` records "nothing to propose".
    proposals: BTreeMap<Round, Option<Proposal>>,
    current_round: Round,
}

impl OrderingService {
    pub fn new(
        transaction_limit: usize,
        proposal_factory: Arc<dyn ProposalFactory>,
        tx_cache: Arc<dyn TxPresenceCache>,
        creation_strategy: Box<dyn CreationStrategy>,
        initial_round: Round,
    ) -> Self {
        OrderingService {
            transaction_limit,
            proposal_factory,
            tx_cache,
            creation_strategy,
            batches: VecDeque::new(),
            queued: HashSet::new(),
            proposals: BTreeMap::new(),
            current_round: initial_round,
        }
    }

    /// A batch is already processed when the ledger has finalized any of its
    /// transactions.
    fn batch_already_processed(&self, batch: &TransactionBatch) -> bool {
        batch.transactions.iter().any(|tx| {
            let status = self.tx_cache.check(&tx.hash());
            if status.is_final() {
                warn!("[{}] duplicate transaction: {}", "ordering".yellow(), tx.hash());
                true
            } else {
                false
            }
        })
    }

    fn admit_batch(&mut self, admitted_at: u64, batch: TransactionBatch) {
        let reduced = batch.reduced_hash();
        if self.queued.contains(&reduced) {
            debug!("[{}] batch {} already queued", "ordering".yellow(), reduced);
            return;
        }
        if self.batch_already_processed(&batch) {
            return;
        }
        self.queued.insert(reduced);
        self.batches.push_back(AdmittedBatch { admitted_at, batch });
    }

    /// Transactions for the next proposal: whole batches in admission order
    /// while they fit under the limit.
    fn collect_transactions(&self) -> Vec<(u64, Transaction)> {
        let mut collection = vec![];
        for admitted in &self.batches {
            if collection.len() + admitted.batch.transactions.len() > self.transaction_limit {
                break;
            }
            for tx in &admitted.batch.transactions {
                collection.push((admitted.admitted_at, tx.clone()));
            }
        }
        collection
    }

    fn pack_proposal(&mut self, round: Round) -> Option<Proposal> {
        let mut collection = self.collect_transactions();
        if collection.is_empty() {
            debug!("[{}] no transactions to create a proposal for {}", "ordering".yellow(), round);
            return None;
        }
        // Admission order first; the hash tie-break within one admission
        // instant is consensus-relevant.
        collection.sort_by(|(at_a, tx_a), (at_b, tx_b)| {
            at_a.cmp(at_b).then_with(|| tx_a.hash().cmp(&tx_b.hash()))
        });
        let transactions: Vec<Transaction> = collection.into_iter().map(|(_, tx)| tx).collect();
        debug!(
            "[{}] packed proposal for {} with {} transactions",
            "ordering".yellow(),
            round,
            transactions.len()
        );
        Some(self.proposal_factory.create(round, transactions, util::now_millis()))
    }

    /// Serves a cached decision or assembles one for a servable round.
    fn upload_proposal(&mut self, round: Round) -> Option<Proposal> {
        if let Some(cached) = self.proposals.get(&round) {
            return cached.clone();
        }
        if round < self.current_round {
            debug!("[{}] request for stale round {}", "ordering".yellow(), round);
            return None;
        }
        let distance = if round.block_round == self.current_round.block_round {
            (round.reject_round - self.current_round.reject_round) as u64
        } else {
            round.block_round - self.current_round.block_round
        };
        if distance > MAX_ROUNDS_AHEAD {
            debug!("[{}] request for far-future round {}", "ordering".yellow(), round);
            return None;
        }
        if !self.creation_strategy.should_create(&round) {
            debug!("[{}] creation strategy declined round {}", "ordering".yellow(), round);
            return None;
        }
        let proposal = self.pack_proposal(round);
        self.proposals.insert(round, proposal.clone());
        self.creation_strategy.on_proposal_request(round);
        proposal
    }

    /// Drops cached decisions for rounds strictly older than `round`.
    fn try_erase(&mut self, round: Round) {
        let retained = self.proposals.split_off(&round);
        let erased = std::mem::replace(&mut self.proposals, retained);
        for evicted in erased.keys() {
            debug!("[{}] erased proposal for {}", "ordering".yellow(), evicted);
        }
    }

    fn remove_finalized(&mut self, hashes: &HashSet<TxHash>) {
        let queued = &mut self.queued;
        self.batches.retain(|admitted| {
            if admitted.batch.contains_any(hashes) {
                queued.remove(&admitted.batch.reduced_hash());
                false
            } else {
                true
            }
        });
    }
}

impl Actor for OrderingService {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!(": started");
    }
}

/// Transaction batches pushed from a peer (or the local gate).
#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "()")]
pub struct PushBatches {
    pub batches: Vec<TransactionBatch>,
}

impl Handler<PushBatches> for OrderingService {
    type Result = ();

    fn handle(&mut self, msg: PushBatches, _ctx: &mut Context<Self>) -> Self::Result {
        let now = util::now_millis();
        let count = msg.batches.len();
        for batch in msg.batches {
            self.admit_batch(now, batch);
        }
        info!("[{}] on batches => collection size = {}", "ordering".yellow(), count);
    }
}

/// Proposal request for a round.
#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "ProposalReply")]
pub struct GetProposal {
    pub round: Round,
}

#[derive(Debug, Clone, Serialize, Deserialize, MessageResponse)]
pub struct ProposalReply {
    pub proposal: Option<Proposal>,
}

impl Handler<GetProposal> for OrderingService {
    type Result = ProposalReply;

    fn handle(&mut self, msg: GetProposal, _ctx: &mut Context<Self>) -> Self::Result {
        debug!("[{}] requesting a proposal for round {}", "ordering".yellow(), msg.round);
        let proposal = self.upload_proposal(msg.round);
        debug!(
            "[{}] {}returning a proposal for {}",
            "ordering".yellow(),
            if proposal.is_some() { "" } else { "NOT " },
            msg.round
        );
        ProposalReply { proposal }
    }
}

/// The local node entered `round`; state strictly older is evicted and the
/// new round's proposal is assembled eagerly.
#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "()")]
pub struct RoundAdvance {
    pub round: Round,
}

impl Handler<RoundAdvance> for OrderingService {
    type Result = ();

    fn handle(&mut self, msg: RoundAdvance, _ctx: &mut Context<Self>) -> Self::Result {
        info!("[{}] round advanced => {}", "ordering".yellow(), msg.round);
        self.current_round = msg.round;
        let _ = self.upload_proposal(msg.round);
        self.try_erase(msg.round);
    }
}

/// Hashes finalized by a committed block; matching queued batches are gone.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct TxsFinalized {
    pub hashes: HashSet<TxHash>,
}

impl Handler<TxsFinalized> for OrderingService {
    type Result = ();

    fn handle(&mut self, msg: TxsFinalized, _ctx: &mut Context<Self>) -> Self::Result {
        self.remove_finalized(&msg.hashes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordering::{AlwaysCreateStrategy, UniqueCreationStrategy};
    use crate::proposal::UncheckedProposalFactory;
    use crate::tx_cache::MemoryTxCache;

    fn service_with(
        limit: usize,
        tx_cache: Arc<MemoryTxCache>,
        strategy: Box<dyn CreationStrategy>,
    ) -> OrderingService {
        OrderingService::new(
            limit,
            Arc::new(UncheckedProposalFactory),
            tx_cache,
            strategy,
            Round::new(1, 0),
        )
    }

    fn service(limit: usize) -> OrderingService {
        service_with(limit, Arc::new(MemoryTxCache::new()), Box::new(AlwaysCreateStrategy))
    }

    fn batch(payloads: &[&[u8]]) -> TransactionBatch {
        TransactionBatch::new(payloads.iter().map(|p| Transaction::new(p.to_vec(), 0)).collect())
    }

    #[test]
    fn test_fifo_order_between_admissions() {
        let mut service = service(10);
        service.admit_batch(1, batch(&[b"x", b"y"]));
        service.admit_batch(2, batch(&[b"a"]));

        let proposal = service.upload_proposal(Round::new(1, 0)).unwrap();
        let hashes: Vec<TxHash> = proposal.transactions.iter().map(|tx| tx.hash()).collect();

        let mut first: Vec<TxHash> =
            batch(&[b"x", b"y"]).transactions.iter().map(|tx| tx.hash()).collect();
        first.sort();
        let expected: Vec<TxHash> = first
            .into_iter()
            .chain(std::iter::once(Transaction::new(b"a".to_vec(), 0).hash()))
            .collect();
        assert_eq!(hashes, expected);
    }

    #[test]
    fn test_hash_tiebreak_within_admission_instant() {
        let mut service = service(10);
        service.admit_batch(7, batch(&[b"m"]));
        service.admit_batch(7, batch(&[b"n", b"k"]));

        let proposal = service.upload_proposal(Round::new(1, 0)).unwrap();
        let hashes: Vec<TxHash> = proposal.transactions.iter().map(|tx| tx.hash()).collect();

        let mut expected: Vec<TxHash> = [b"m" as &[u8], b"n", b"k"]
            .iter()
            .map(|p| Transaction::new(p.to_vec(), 0).hash())
            .collect();
        expected.sort();
        assert_eq!(hashes, expected);
    }

    #[test]
    fn test_limit_takes_whole_batches() {
        let mut service = service(3);
        service.admit_batch(1, batch(&[b"a", b"b"]));
        service.admit_batch(2, batch(&[b"c", b"d"]));

        let proposal = service.upload_proposal(Round::new(1, 0)).unwrap();
        assert_eq!(proposal.transactions.len(), 2);
    }

    #[test]
    fn test_proposal_decision_is_cached() {
        let mut service = service(10);
        service.admit_batch(1, batch(&[b"a"]));

        let first = service.upload_proposal(Round::new(1, 0)).unwrap();
        service.admit_batch(2, batch(&[b"b"]));
        let second = service.upload_proposal(Round::new(1, 0)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_decision_is_cached() {
        let mut service = service(10);
        assert!(service.upload_proposal(Round::new(1, 0)).is_none());

        // the round was decided empty; later admissions do not reopen it
        service.admit_batch(1, batch(&[b"a"]));
        assert!(service.upload_proposal(Round::new(1, 0)).is_none());
    }

    #[test]
    fn test_stale_round_returns_empty() {
        let mut service = service(10);
        service.admit_batch(1, batch(&[b"a"]));
        service.current_round = Round::new(5, 0);
        assert!(service.upload_proposal(Round::new(4, 9)).is_none());
    }

    #[test]
    fn test_far_future_round_returns_empty() {
        let mut service = service(10);
        service.admit_batch(1, batch(&[b"a"]));
        service.current_round = Round::new(5, 0);

        assert!(service.upload_proposal(Round::new(8, 0)).is_none());
        assert!(service.upload_proposal(Round::new(7, 0)).is_some());
        assert!(service.upload_proposal(Round::new(5, 2)).is_some());
    }

    #[test]
    fn test_round_advance_evicts_older() {
        let mut service = service(10);
        service.admit_batch(1, batch(&[b"a"]));
        assert!(service.upload_proposal(Round::new(1, 0)).is_some());
        assert!(service.upload_proposal(Round::new(1, 1)).is_some());

        service.current_round = Round::new(2, 0);
        let _ = service.upload_proposal(Round::new(2, 0));
        service.try_erase(Round::new(2, 0));

        // the old decisions are gone, and the rounds are now stale
        assert!(!service.proposals.contains_key(&Round::new(1, 0)));
        assert!(!service.proposals.contains_key(&Round::new(1, 1)));
        assert!(service.upload_proposal(Round::new(1, 0)).is_none());
    }

    #[test]
    fn test_duplicate_batch_not_queued_twice() {
        let mut service = service(10);
        service.admit_batch(1, batch(&[b"a"]));
        service.admit_batch(2, batch(&[b"a"]));
        assert_eq!(service.batches.len(), 1);
    }

    #[test]
    fn test_finalized_batch_rejected_on_admission() {
        let tx_cache = Arc::new(MemoryTxCache::new());
        tx_cache.mark_committed(Transaction::new(b"a".to_vec(), 0).hash());

        let mut service = service_with(10, tx_cache, Box::new(AlwaysCreateStrategy));
        service.admit_batch(1, batch(&[b"a", b"b"]));
        assert!(service.batches.is_empty());
    }

    #[test]
    fn test_finalized_hashes_drain_the_queue() {
        let mut service = service(10);
        service.admit_batch(1, batch(&[b"a", b"b"]));
        service.admit_batch(2, batch(&[b"c"]));

        let finalized: HashSet<TxHash> =
            [Transaction::new(b"a".to_vec(), 0).hash()].iter().cloned().collect();
        service.remove_finalized(&finalized);

        assert_eq!(service.batches.len(), 1);
        assert!(service.upload_proposal(Round::new(1, 0)).is_some());
    }

    #[test]
    fn test_unique_strategy_declines_second_decision() {
        let mut service = service_with(
            10,
            Arc::new(MemoryTxCache::new()),
            Box::new(UniqueCreationStrategy::new()),
        );
        service.admit_batch(1, batch(&[b"a"]));

        let first = service.upload_proposal(Round::new(1, 0));
        assert!(first.is_some());

        // the cached decision is served; after eviction the strategy blocks
        // a second assembly for the same round
        assert_eq!(service.upload_proposal(Round::new(1, 0)), first);
        service.proposals.clear();
        assert!(service.upload_proposal(Round::new(1, 0)).is_none());
    }

    #[actix_rt::test]
    async fn test_request_proposal_through_the_mailbox() {
        let mut service = service(10);
        service.admit_batch(1, batch(&[b"a"]));
        let addr = service.start();

        let reply = addr.send(GetProposal { round: Round::new(1, 0) }).await.unwrap();
        let proposal = reply.proposal.unwrap();
        assert_eq!(proposal.round, Round::new(1, 0));
        assert_eq!(proposal.transactions.len(), 1);

        addr.send(RoundAdvance { round: Round::new(2, 0) }).await.unwrap();
        let reply = addr.send(GetProposal { round: Round::new(1, 0) }).await.unwrap();
        assert!(reply.proposal.is_none());
    }
}
