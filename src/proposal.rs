//! Proposals and the trusted factory assembling them.

use crate::round::Round;
use crate::tx::Transaction;

/// An ordered sequence of transactions bound to the round it was assembled
/// for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub round: Round,
    pub created_time: u64,
    pub transactions: Vec<Transaction>,
}

impl Proposal {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Assembles a proposal from transactions that already passed admission.
/// No stateful validation happens behind this seam.
pub trait ProposalFactory: Send + Sync {
    fn create(&self, round: Round, transactions: Vec<Transaction>, created_time: u64) -> Proposal;
}

/// Factory that packs whatever it is given, trusting the caller.
#[derive(Debug, Default, Clone)]
pub struct UncheckedProposalFactory;

impl ProposalFactory for UncheckedProposalFactory {
    fn create(&self, round: Round, transactions: Vec<Transaction>, created_time: u64) -> Proposal {
        Proposal { round, created_time, transactions }
    }
}
