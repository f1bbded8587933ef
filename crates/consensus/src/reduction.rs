//! Reduction vote aggregator.
//!
//! One aggregator exists per reduction step. It enforces first-vote-wins
//! per committee member, counts votes by committee slots, folds signatures
//! into a running BLS aggregate per block hash, and reports quorum the
//! moment one hash strictly exceeds the reduction quorum.

use crate::{ConsensusError, ConsensusState};
use sba_types::{
    BlsSignature, Committee, CommitteeBitset, ConsensusHeader, Hash, Reduction, StepVotes,
};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Accumulated votes for one block hash.
#[derive(Debug, Clone)]
struct VoteSet {
    bitset: CommitteeBitset,
    slots: usize,
    aggregate: BlsSignature,
}

impl VoteSet {
    fn new() -> Self {
        Self {
            bitset: CommitteeBitset::EMPTY,
            slots: 0,
            aggregate: BlsSignature::identity(),
        }
    }
}

/// Outcome of collecting one vote.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatorOutcome {
    Pending,
    /// A hash strictly exceeded the quorum. The first hash to do so wins;
    /// competitors are discarded with the aggregator.
    Quorum { hash: Hash, votes: StepVotes },
}

/// Per-step vote accumulator.
#[derive(Debug)]
pub struct Aggregator {
    round: u64,
    step: u8,
    committee: Committee,
    /// Strictly-exceeded slot threshold.
    quorum: usize,
    /// Members that already voted this step, across all hashes.
    voted: CommitteeBitset,
    sets: HashMap<Hash, VoteSet>,
}

impl Aggregator {
    pub fn new(round: u64, step: u8, committee: Committee, quorum_rate: f64) -> Self {
        let quorum = committee.quorum(quorum_rate);
        Self {
            round,
            step,
            committee,
            quorum,
            voted: CommitteeBitset::EMPTY,
            sets: HashMap::new(),
        }
    }

    pub fn committee(&self) -> &Committee {
        &self.committee
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Collect one reduction vote.
    ///
    /// The vote's BLS signature is verified here, before any aggregation.
    /// A second vote from the same member is dropped regardless of which
    /// hash it endorses.
    pub fn collect(&mut self, reduction: &Reduction) -> Result<AggregatorOutcome, ConsensusError> {
        let header = &reduction.header;
        if header.round != self.round {
            return Err(ConsensusError::WrongRound {
                got: header.round,
                current: self.round,
            });
        }
        if header.step != self.step {
            return Err(ConsensusError::WrongStep {
                got: header.step,
                current: self.step,
            });
        }

        let index = self
            .committee
            .index_of(&header.pub_key_bls)
            .ok_or(ConsensusError::NotAMember)?;
        if self.voted.is_set(index) {
            return Err(ConsensusError::DuplicateVote);
        }

        header
            .pub_key_bls
            .verify(&header.signable(), &reduction.signed_hash)?;

        self.voted.set(index);
        let slots = self.committee.slots(&header.pub_key_bls);
        let set = self.sets.entry(header.block_hash).or_insert_with(VoteSet::new);
        set.bitset.set(index);
        set.slots += slots;
        set.aggregate = set.aggregate.combine(&reduction.signed_hash);

        trace!(
            round = self.round,
            step = self.step,
            hash = %header.block_hash,
            slots = set.slots,
            quorum = self.quorum,
            "collected reduction vote"
        );

        if set.slots > self.quorum {
            debug!(
                round = self.round,
                step = self.step,
                hash = %header.block_hash,
                slots = set.slots,
                "reduction quorum reached"
            );
            return Ok(AggregatorOutcome::Quorum {
                hash: header.block_hash,
                votes: StepVotes::new(set.aggregate, set.bitset, self.step),
            });
        }

        Ok(AggregatorOutcome::Pending)
    }
}

/// Build this node's reduction vote for `(round, step, hash)`.
pub(crate) fn own_vote(state: &ConsensusState, hash: Hash) -> Reduction {
    let header = ConsensusHeader {
        pub_key_bls: state.keys().bls.public_key(),
        round: state.round(),
        step: state.step(),
        block_hash: hash,
    };
    Reduction {
        signed_hash: state.keys().bls.sign(&header.signable()),
        header,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sba_types::test_utils::test_provisioners;
    use sba_types::{create_voting_committee, NodeKeys, Seed};

    fn setup(n: u8) -> (Committee, Vec<NodeKeys>) {
        let (provisioners, keys) = test_provisioners(n, 1000, 1000);
        let committee =
            create_voting_committee(&provisioners, &Seed::from_bytes([1; 48]), 3, 1, 64);
        (committee, keys)
    }

    fn vote(keys: &NodeKeys, round: u64, step: u8, hash: Hash) -> Reduction {
        let header = ConsensusHeader {
            pub_key_bls: keys.bls.public_key(),
            round,
            step,
            block_hash: hash,
        };
        Reduction {
            signed_hash: keys.bls.sign(&header.signable()),
            header,
        }
    }

    #[test]
    fn quorum_emits_step_votes() {
        let (committee, keys) = setup(5);
        let mut agg = Aggregator::new(3, 1, committee.clone(), 0.75);
        let hash = Hash::digest(b"candidate");

        let mut outcome = AggregatorOutcome::Pending;
        for k in &keys {
            outcome = agg.collect(&vote(k, 3, 1, hash)).unwrap();
            if matches!(outcome, AggregatorOutcome::Quorum { .. }) {
                break;
            }
        }

        match outcome {
            AggregatorOutcome::Quorum { hash: h, votes } => {
                assert_eq!(h, hash);
                assert_eq!(votes.step, 1);
                assert!(committee.slots_in_bitset(votes.bitset) > committee.quorum(0.75));
            }
            AggregatorOutcome::Pending => panic!("expected quorum from full committee"),
        }
    }

    #[test]
    fn first_vote_wins_across_hashes() {
        let (committee, keys) = setup(5);
        let mut agg = Aggregator::new(3, 1, committee.clone(), 0.75);

        let first = agg
            .collect(&vote(&keys[0], 3, 1, Hash::digest(b"a")))
            .unwrap();
        assert_eq!(first, AggregatorOutcome::Pending);

        // Same sender, different hash: dropped, and the original bit stays.
        let err = agg
            .collect(&vote(&keys[0], 3, 1, Hash::digest(b"b")))
            .unwrap_err();
        assert_eq!(err, ConsensusError::DuplicateVote);

        let index = committee.index_of(&keys[0].bls.public_key()).unwrap();
        assert!(agg.voted.is_set(index));
        assert_eq!(agg.voted.count(), 1);
    }

    #[test]
    fn duplicate_same_hash_is_dropped() {
        let (committee, keys) = setup(5);
        let mut agg = Aggregator::new(3, 1, committee, 0.75);
        let hash = Hash::digest(b"a");

        agg.collect(&vote(&keys[0], 3, 1, hash)).unwrap();
        assert_eq!(
            agg.collect(&vote(&keys[0], 3, 1, hash)).unwrap_err(),
            ConsensusError::DuplicateVote
        );
        // The aggregate equals the single-vote case.
        let set = &agg.sets[&hash];
        assert_eq!(set.bitset.count(), 1);
    }

    #[test]
    fn non_member_is_rejected() {
        let (committee, _) = setup(3);
        let outsider = sba_types::test_utils::test_keys(99);
        let mut agg = Aggregator::new(3, 1, committee, 0.75);
        assert_eq!(
            agg.collect(&vote(&outsider, 3, 1, Hash::ZERO)).unwrap_err(),
            ConsensusError::NotAMember
        );
    }

    #[test]
    fn bad_signature_is_rejected() {
        let (committee, keys) = setup(3);
        let mut agg = Aggregator::new(3, 1, committee, 0.75);
        let mut red = vote(&keys[0], 3, 1, Hash::digest(b"a"));
        // Signature over a different hash.
        red.signed_hash = keys[0].bls.sign(b"something else");
        assert!(matches!(
            agg.collect(&red).unwrap_err(),
            ConsensusError::InvalidSignature(_)
        ));
    }

    #[test]
    fn wrong_step_is_rejected() {
        let (committee, keys) = setup(3);
        let mut agg = Aggregator::new(3, 1, committee, 0.75);
        assert!(matches!(
            agg.collect(&vote(&keys[0], 3, 2, Hash::ZERO)).unwrap_err(),
            ConsensusError::WrongStep { .. }
        ));
    }

    #[test]
    fn below_quorum_stays_pending() {
        let (committee, keys) = setup(5);
        let mut agg = Aggregator::new(3, 1, committee.clone(), 0.75);
        let hash = Hash::digest(b"candidate");

        // Vote with members until just at (not strictly above) quorum.
        let quorum = committee.quorum(0.75);
        let mut slots = 0;
        for k in &keys {
            let member_slots = committee.slots(&k.bls.public_key());
            if slots + member_slots > quorum {
                break;
            }
            slots += member_slots;
            assert_eq!(
                agg.collect(&vote(k, 3, 1, hash)).unwrap(),
                AggregatorOutcome::Pending
            );
        }
    }
}
