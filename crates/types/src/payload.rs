//! Consensus message payloads.

use crate::{BlsPublicKey, BlsSignature, Hash, Seed, StepVotes};

/// The header carried by every consensus message. Identifies the sender's
/// BLS key and pins the message to a `(round, step, block_hash)` triple.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ConsensusHeader {
    pub pub_key_bls: BlsPublicKey,
    pub round: u64,
    pub step: u8,
    pub block_hash: Hash,
}

impl ConsensusHeader {
    /// The bytes a committee member signs when voting: `round ‖ step ‖
    /// block_hash`, little-endian. All votes for the same triple sign the
    /// same bytes, which is what makes them aggregatable.
    pub fn signable_vote_bytes(round: u64, step: u8, block_hash: &Hash) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 1 + 32);
        out.extend_from_slice(&round.to_le_bytes());
        out.push(step);
        out.extend_from_slice(block_hash.as_bytes());
        out
    }

    pub fn signable(&self) -> Vec<u8> {
        Self::signable_vote_bytes(self.round, self.step, &self.block_hash)
    }
}

/// A reduction vote: the sender's BLS signature over the signable vote
/// bytes of its header.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Reduction {
    pub header: ConsensusHeader,
    pub signed_hash: BlsSignature,
}

/// An agreement message: the two reduction StepVotes certifying the block
/// hash in the header. `header.step` is the second reduction step of the
/// certified iteration.
#[derive(Clone, PartialEq, Debug)]
pub struct Agreement {
    pub header: ConsensusHeader,
    pub votes_per_step: [StepVotes; 2],
}

/// The output of the blind-bid prover.
#[derive(Clone, PartialEq, Debug)]
pub struct ScoreProof {
    /// Big-endian score; higher wins.
    pub score: [u8; 32],
    /// Opaque proof bytes, verified by the score verifier.
    pub proof: Vec<u8>,
    pub z: [u8; 32],
    /// Serialized bid subset the proof was computed over.
    pub bid_list_subset: Vec<u8>,
}

/// A published score: the proof plus the candidate block it backs.
/// `header.block_hash` is the candidate hash.
#[derive(Clone, PartialEq, Debug)]
pub struct ScoreEvent {
    pub header: ConsensusHeader,
    pub score: [u8; 32],
    pub proof: Vec<u8>,
    pub z: [u8; 32],
    pub bid_list_subset: Vec<u8>,
    /// The round seed the proof was generated against.
    pub seed: Seed,
    pub prev_hash: Hash,
}

impl ScoreEvent {
    /// Whether this score outranks `other`: higher score wins, ties break
    /// to the lexicographically lower candidate hash.
    pub fn outranks(&self, other: &ScoreEvent) -> bool {
        match self.score.cmp(&other.score) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.header.block_hash < other.header.block_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_keys;

    fn score_event(score: [u8; 32], hash: Hash) -> ScoreEvent {
        ScoreEvent {
            header: ConsensusHeader {
                pub_key_bls: test_keys(1).bls.public_key(),
                round: 1,
                step: 0,
                block_hash: hash,
            },
            score,
            proof: vec![],
            z: [0; 32],
            bid_list_subset: vec![],
            seed: Seed::zero(),
            prev_hash: Hash::ZERO,
        }
    }

    #[test]
    fn signable_bytes_layout() {
        let bytes = ConsensusHeader::signable_vote_bytes(1, 2, &Hash::ZERO);
        assert_eq!(bytes.len(), 41);
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[8], 2);
    }

    #[test]
    fn higher_score_outranks() {
        let mut high = [0u8; 32];
        high[0] = 9;
        let mut low = [0u8; 32];
        low[0] = 1;
        assert!(score_event(high, Hash::ZERO).outranks(&score_event(low, Hash::ZERO)));
        assert!(!score_event(low, Hash::ZERO).outranks(&score_event(high, Hash::ZERO)));
    }

    #[test]
    fn tie_breaks_to_lower_hash() {
        let score = [5u8; 32];
        let a = score_event(score, Hash::from_bytes([1; 32]));
        let b = score_event(score, Hash::from_bytes([2; 32]));
        assert!(a.outranks(&b));
        assert!(!b.outranks(&a));
    }
}
