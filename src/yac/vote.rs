//! Vote messages exchanged by the consensus peers.

use crate::ledger::PublicKey;
use crate::round::Round;

use std::fmt;

/// Hash of the proposal a vote endorses.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalHash(pub [u8; 32]);

impl ProposalHash {
    pub fn digest(bytes: &[u8]) -> Self {
        ProposalHash(*blake3::hash(bytes).as_bytes())
    }
}

impl fmt::Debug for ProposalHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.0)[..8])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSignature {
    pub public_key: PublicKey,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMessage {
    pub hash: ProposalHash,
    pub signature: VoteSignature,
    pub round: Round,
}

/// Wire bundle of votes. Valid only if all votes carry the same round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub votes: Vec<VoteMessage>,
}

/// Whether all votes in the bundle agree on the round key.
pub fn same_round(votes: &[VoteMessage]) -> bool {
    votes.windows(2).all(|pair| pair[0].round == pair[1].round)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(block_round: u64, reject_round: u32) -> VoteMessage {
        VoteMessage {
            hash: ProposalHash::digest(b"proposal"),
            signature: VoteSignature { public_key: PublicKey([3u8; 32]), signature: vec![0u8; 64] },
            round: Round::new(block_round, reject_round),
        }
    }

    #[test]
    fn test_same_round_uniform() {
        assert!(same_round(&[vote(5, 0), vote(5, 0), vote(5, 0)]));
        assert!(same_round(&[vote(7, 2)]));
    }

    #[test]
    fn test_same_round_mixed() {
        assert!(!same_round(&[vote(5, 0), vote(5, 1)]));
        assert!(!same_round(&[vote(5, 0), vote(6, 0)]));
        assert!(!same_round(&[vote(5, 0), vote(5, 0), vote(4, 0)]));
    }
}
