//! Transactions and transaction batches as the ordering core sees them:
//! opaque payloads with a content hash and an admission timestamp.

use std::fmt;

/// Content hash of a transaction. Ordered ascending as the tie-break within
/// a proposal, which makes `Ord` here consensus-relevant.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.0)[..8])
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.0)[..8])
    }
}

/// A transaction opaque to the ordering core. Stateful validation happens
/// elsewhere; here a transaction is its payload, its creation time and the
/// hash derived from the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub payload: Vec<u8>,
    pub created_time: u64,
}

impl Transaction {
    pub fn new(payload: Vec<u8>, created_time: u64) -> Self {
        Transaction { payload, created_time }
    }

    pub fn hash(&self) -> TxHash {
        TxHash(*blake3::hash(&self.payload).as_bytes())
    }
}

/// An atomic group of transactions admitted and forwarded together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBatch {
    pub transactions: Vec<Transaction>,
}

impl TransactionBatch {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        TransactionBatch { transactions }
    }

    /// Hash over the contained transaction hashes, identifying the batch.
    pub fn reduced_hash(&self) -> TxHash {
        let mut hasher = blake3::Hasher::new();
        for tx in &self.transactions {
            hasher.update(tx.hash().as_bytes());
        }
        TxHash(*hasher.finalize().as_bytes())
    }

    pub fn contains_any(&self, hashes: &std::collections::HashSet<TxHash>) -> bool {
        self.transactions.iter().any(|tx| hashes.contains(&tx.hash()))
    }
}
