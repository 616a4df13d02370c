//! Ledger-facing types shared by the ordering and voting components: block
//! hashes, peers, ledger state snapshots and synchronizer outcomes.

use crate::round::Round;
use crate::tx::{Transaction, TxHash};

use std::convert::TryInto;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

pub const HASH_LENGTH: usize = 32;

/// Hash of a committed block. The only property the ordering machinery
/// relies on is a uniform byte distribution, suitable as a PRNG seed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct BlockHash(pub [u8; HASH_LENGTH]);

impl BlockHash {
    pub fn new(bytes: [u8; HASH_LENGTH]) -> Self {
        BlockHash(bytes)
    }

    /// Hashes arbitrary content into a block hash.
    pub fn digest(bytes: &[u8]) -> Self {
        BlockHash(*blake3::hash(bytes).as_bytes())
    }

    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let bytes = hex::decode(s).map_err(|_| crate::Error::HashParseError)?;
        let bytes: [u8; HASH_LENGTH] =
            bytes.as_slice().try_into().map_err(|_| crate::Error::HashParseError)?;
        Ok(BlockHash(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.0)[..8])
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.0)[..8])
    }
}

/// Raw ed25519 public key bytes. The public key is the peer identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let bytes = hex::decode(s).map_err(|_| crate::Error::PeerParseError)?;
        let bytes: [u8; 32] =
            bytes.as_slice().try_into().map_err(|_| crate::Error::PeerParseError)?;
        Ok(PublicKey(bytes))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.0)[..8])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.0)[..8])
    }
}

/// A ledger peer. Two peers are the same peer iff their public keys match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub address: SocketAddr,
    pub public_key: PublicKey,
    pub tls_certificate: Option<Vec<u8>>,
}

impl Peer {
    pub fn new(address: SocketAddr, public_key: PublicKey) -> Self {
        Peer { address, public_key, tls_certificate: None }
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

impl Eq for Peer {}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.public_key, self.address)
    }
}

/// Immutable snapshot of the ledger as of some committed height. Shared by
/// reference between every component that holds a round alive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerState {
    /// Ordered list of ledger peers; permutations index into this list.
    pub ledger_peers: Vec<Peer>,
    /// Height of the top committed block.
    pub top_block_height: u64,
}

impl LedgerState {
    pub fn new(ledger_peers: Vec<Peer>, top_block_height: u64) -> Arc<Self> {
        Arc::new(LedgerState { ledger_peers, top_block_height })
    }
}

/// Outcome of a consensus round as resolved by the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOutcome {
    Commit,
    Reject,
    Nothing,
}

/// Emitted by the synchronizer after it resolves a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynchronizationEvent {
    pub round: Round,
    pub sync_outcome: SyncOutcome,
    pub ledger_state: Arc<LedgerState>,
}

/// A committed block, reduced to what the ordering core consumes: its own
/// hash and the hashes that became final with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub hash: BlockHash,
    pub transactions: Vec<Transaction>,
    pub rejected_transactions_hashes: Vec<TxHash>,
}

impl Block {
    /// Union of committed and rejected transaction hashes; everything in it
    /// is final and must leave the pending caches.
    pub fn finalized_hashes(&self) -> std::collections::HashSet<TxHash> {
        self.transactions
            .iter()
            .map(|tx| tx.hash())
            .chain(self.rejected_transactions_hashes.iter().cloned())
            .collect()
    }
}
