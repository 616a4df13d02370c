//! Pending-batch cache held by the ordering gate.
//!
//! Batches accepted for propagation stay here until a committed block
//! finalizes one of their transactions; on every round switch the pending
//! set is re-forwarded to the new round's consumers so a batch that missed
//! its round is not lost.

use crate::tx::{TransactionBatch, TxHash};

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct BatchCache {
    batches: Vec<TransactionBatch>,
    known: HashSet<TxHash>,
}

impl BatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a batch; returns `false` for a batch already pending.
    pub fn insert(&mut self, batch: TransactionBatch) -> bool {
        if !self.known.insert(batch.reduced_hash()) {
            return false;
        }
        self.batches.push(batch);
        true
    }

    /// Drops every pending batch containing one of the finalized hashes.
    /// Returns the number of batches removed.
    pub fn evict(&mut self, finalized: &HashSet<TxHash>) -> usize {
        let before = self.batches.len();
        let known = &mut self.known;
        self.batches.retain(|batch| {
            if batch.contains_any(finalized) {
                known.remove(&batch.reduced_hash());
                false
            } else {
                true
            }
        });
        before - self.batches.len()
    }

    pub fn pending(&self) -> Vec<TransactionBatch> {
        self.batches.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }
}
