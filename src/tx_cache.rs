//! Presence cache for transaction hashes already resolved by the ledger.
//!
//! The cache itself is owned by the storage layer; the ordering core only
//! consumes the lookup seam defined here.

use crate::tx::TxHash;

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Committed,
    Rejected,
    Unknown,
}

impl TxStatus {
    /// A transaction already committed or rejected is final and must not be
    /// ordered again.
    pub fn is_final(&self) -> bool {
        matches!(self, TxStatus::Committed | TxStatus::Rejected)
    }
}

pub trait TxPresenceCache: Send + Sync {
    fn check(&self, hash: &TxHash) -> TxStatus;
}

/// In-memory presence cache, used for wiring the core without a storage
/// backend and throughout the tests.
#[derive(Default)]
pub struct MemoryTxCache {
    statuses: Mutex<HashMap<TxHash, TxStatus>>,
}

impl MemoryTxCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_committed(&self, hash: TxHash) {
        self.statuses.lock().unwrap().insert(hash, TxStatus::Committed);
    }

    pub fn mark_rejected(&self, hash: TxHash) {
        self.statuses.lock().unwrap().insert(hash, TxStatus::Rejected);
    }
}

impl TxPresenceCache for MemoryTxCache {
    fn check(&self, hash: &TxHash) -> TxStatus {
        self.statuses.lock().unwrap().get(hash).cloned().unwrap_or(TxStatus::Unknown)
    }
}
