//! Deterministic peer permutations derived from block hashes.
//!
//! Every honest node must derive byte-identical permutations from the same
//! block hash, otherwise the role assignment diverges and the network splits.
//! The construction below is therefore fixed and part of the wire contract:
//! a ChaCha20 stream seeded with the 32-byte block hash drives a descending
//! Fisher-Yates shuffle of `[0, n)`, drawing each index as
//! `next_u64() % (i + 1)`.

use crate::ledger::BlockHash;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Produces the permutation of `[0, n)` selected by `hash`.
///
/// An empty peer list has no meaningful permutation; callers are expected to
/// refuse role assignment before reaching this point.
pub fn seeded_permutation(hash: &BlockHash, n: usize) -> Vec<usize> {
    debug_assert!(n > 0, "permutation over an empty index space");

    let mut rng = ChaCha20Rng::from_seed(*hash.as_bytes());
    let mut permutation: Vec<usize> = (0..n).collect();
    for i in (1..n).rev() {
        let j = (rng.next_u64() % (i as u64 + 1)) as usize;
        permutation.swap(i, j);
    }
    permutation
}
