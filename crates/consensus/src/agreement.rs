//! Agreement collector.
//!
//! Runs for the whole round, in parallel with the phase pipeline. Committee
//! members publish an `Agreement` once both reduction steps of an iteration
//! produced StepVotes for the same hash; the collector verifies both
//! embedded aggregates and certifies the hash when the slot-weighted count
//! of distinct senders crosses the agreement quorum.

use crate::ConsensusError;
use sba_types::{
    aggregate_verify, create_voting_committee, Agreement, Certificate, Committee, CommitteeBitset,
    ConsensusHeader, Hash, Provisioners, Seed, StepVotes,
};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Collects agreement messages for one round.
pub struct AgreementCollector {
    round: u64,
    seed: Seed,
    provisioners: Provisioners,
    committee_size: usize,
    agreement_quorum_rate: f64,
    reduction_quorum_rate: f64,
    /// Slot-weighted agreement count per block hash.
    counts: HashMap<Hash, usize>,
    /// Senders already counted, per agreement step.
    seen: HashMap<u8, CommitteeBitset>,
    /// Committee cache, keyed by step.
    committees: HashMap<u8, Committee>,
}

impl AgreementCollector {
    pub fn new(
        round: u64,
        seed: Seed,
        provisioners: Provisioners,
        committee_size: usize,
        agreement_quorum_rate: f64,
        reduction_quorum_rate: f64,
    ) -> Self {
        Self {
            round,
            seed,
            provisioners,
            committee_size,
            agreement_quorum_rate,
            reduction_quorum_rate,
            counts: HashMap::new(),
            seen: HashMap::new(),
            committees: HashMap::new(),
        }
    }

    fn committee(&mut self, step: u8) -> &Committee {
        let round = self.round;
        let seed = self.seed;
        let size = self.committee_size;
        let provisioners = &self.provisioners;
        self.committees
            .entry(step)
            .or_insert_with(|| create_voting_committee(provisioners, &seed, round, step, size))
    }

    /// Whether `key` sits in the agreement committee for `step`.
    pub fn is_member(&mut self, key: &sba_types::BlsPublicKey, step: u8) -> bool {
        self.committee(step).is_member(key)
    }

    /// Verify one embedded StepVotes against its step committee.
    fn verify_step_votes(
        &mut self,
        votes: &StepVotes,
        block_hash: &Hash,
    ) -> Result<(), ConsensusError> {
        if votes.is_empty() {
            return Err(ConsensusError::Malformed("empty step votes"));
        }
        let round = self.round;
        let committee = self.committee(votes.step).clone();
        if committee.is_empty() {
            return Err(ConsensusError::EmptyCommittee);
        }
        let keys = committee
            .keys_from_bitset(votes.bitset)
            .ok_or(ConsensusError::Malformed("bitset out of committee range"))?;
        if committee.slots_in_bitset(votes.bitset) <= committee.quorum(self.reduction_quorum_rate) {
            return Err(ConsensusError::QuorumMiss);
        }
        let signable = ConsensusHeader::signable_vote_bytes(round, votes.step, block_hash);
        aggregate_verify(&keys, &signable, &votes.aggregate)?;
        Ok(())
    }

    /// Collect one agreement message. Returns the certified hash and its
    /// certificate when the quorum is crossed.
    pub fn collect(
        &mut self,
        agreement: &Agreement,
    ) -> Result<Option<(Hash, Certificate)>, ConsensusError> {
        let header = &agreement.header;
        if header.round != self.round {
            return Err(ConsensusError::WrongRound {
                got: header.round,
                current: self.round,
            });
        }
        if header.block_hash.is_zero() {
            return Err(ConsensusError::Malformed("agreement on empty hash"));
        }

        let [first, second] = &agreement.votes_per_step;
        if second.step != header.step || first.step.wrapping_add(1) != second.step {
            return Err(ConsensusError::Malformed("step votes do not match header step"));
        }

        // Sender must be a member of the agreement committee for the
        // certificate step, and may only be counted once per step.
        let committee = self.committee(header.step).clone();
        let index = committee
            .index_of(&header.pub_key_bls)
            .ok_or(ConsensusError::NotAMember)?;
        let seen = self.seen.entry(header.step).or_default();
        if seen.is_set(index) {
            return Err(ConsensusError::DuplicateVote);
        }

        self.verify_step_votes(first, &header.block_hash)?;
        self.verify_step_votes(second, &header.block_hash)?;

        // All checks passed; count the sender.
        self.seen.entry(header.step).or_default().set(index);
        let slots = committee.slots(&header.pub_key_bls);
        let count = self.counts.entry(header.block_hash).or_insert(0);
        *count += slots;

        let quorum =
            (committee.total_slots() as f64 * self.agreement_quorum_rate).ceil() as usize;
        trace!(
            round = self.round,
            step = header.step,
            hash = %header.block_hash,
            count = *count,
            quorum,
            "collected agreement"
        );

        if *count >= quorum {
            debug!(
                round = self.round,
                step = header.step,
                hash = %header.block_hash,
                "agreement quorum crossed, certifying"
            );
            return Ok(Some((
                header.block_hash,
                Certificate::from_votes(first, second),
            )));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sba_types::test_utils::test_provisioners;
    use sba_types::{BlsSignature, NodeKeys};

    struct Fixture {
        provisioners: Provisioners,
        keys: Vec<NodeKeys>,
        seed: Seed,
        round: u64,
    }

    impl Fixture {
        fn new() -> Self {
            let (provisioners, keys) = test_provisioners(5, 1000, 1000);
            Self {
                provisioners,
                keys,
                seed: Seed::from_bytes([2; 48]),
                round: 4,
            }
        }

        fn collector(&self) -> AgreementCollector {
            AgreementCollector::new(
                self.round,
                self.seed,
                self.provisioners.clone(),
                64,
                0.67,
                0.75,
            )
        }

        /// Real StepVotes: every member signs and the aggregate is folded.
        fn step_votes(&self, step: u8, hash: Hash) -> StepVotes {
            let committee =
                create_voting_committee(&self.provisioners, &self.seed, self.round, step, 64);
            let signable = ConsensusHeader::signable_vote_bytes(self.round, step, &hash);
            let mut bitset = CommitteeBitset::EMPTY;
            let mut aggregate = BlsSignature::identity();
            for k in &self.keys {
                let pk = k.bls.public_key();
                if let Some(index) = committee.index_of(&pk) {
                    bitset.set(index);
                    aggregate = aggregate.combine(&k.bls.sign(&signable));
                }
            }
            StepVotes::new(aggregate, bitset, step)
        }

        fn agreement(&self, sender: &NodeKeys, step: u8, hash: Hash) -> Agreement {
            Agreement {
                header: ConsensusHeader {
                    pub_key_bls: sender.bls.public_key(),
                    round: self.round,
                    step,
                    block_hash: hash,
                },
                votes_per_step: [self.step_votes(step - 1, hash), self.step_votes(step, hash)],
            }
        }
    }

    #[test]
    fn quorum_certifies_hash() {
        let fx = Fixture::new();
        let mut collector = fx.collector();
        let hash = Hash::digest(b"winner");

        let mut certified = None;
        for k in &fx.keys {
            match collector.collect(&fx.agreement(k, 2, hash)) {
                Ok(Some(result)) => {
                    certified = Some(result);
                    break;
                }
                Ok(None) => {}
                Err(ConsensusError::NotAMember) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        let (certified_hash, cert) = certified.expect("full committee must certify");
        assert_eq!(certified_hash, hash);
        assert_eq!(cert.step, 2);
        assert!(!cert.is_empty());
    }

    #[test]
    fn duplicate_sender_is_dropped() {
        let fx = Fixture::new();
        let mut collector = fx.collector();
        let hash = Hash::digest(b"winner");

        // Find a sender in the step-2 agreement committee.
        let sender = fx
            .keys
            .iter()
            .find(|k| collector.is_member(&k.bls.public_key(), 2))
            .unwrap();

        collector.collect(&fx.agreement(sender, 2, hash)).unwrap();
        assert_eq!(
            collector.collect(&fx.agreement(sender, 2, hash)).unwrap_err(),
            ConsensusError::DuplicateVote
        );
    }

    #[test]
    fn empty_step_votes_are_rejected() {
        let fx = Fixture::new();
        let mut collector = fx.collector();
        let hash = Hash::digest(b"winner");
        let sender = fx
            .keys
            .iter()
            .find(|k| collector.is_member(&k.bls.public_key(), 2))
            .unwrap();

        let mut agreement = fx.agreement(sender, 2, hash);
        agreement.votes_per_step[0] = StepVotes::empty(1);
        assert!(matches!(
            collector.collect(&agreement).unwrap_err(),
            ConsensusError::Malformed(_)
        ));
    }

    #[test]
    fn tampered_aggregate_is_rejected() {
        let fx = Fixture::new();
        let mut collector = fx.collector();
        let hash = Hash::digest(b"winner");
        let sender = fx
            .keys
            .iter()
            .find(|k| collector.is_member(&k.bls.public_key(), 2))
            .unwrap();

        let mut agreement = fx.agreement(sender, 2, hash);
        // Aggregate signed over a different hash.
        agreement.votes_per_step[1] = fx.step_votes(2, Hash::digest(b"other"));
        assert!(matches!(
            collector.collect(&agreement).unwrap_err(),
            ConsensusError::InvalidSignature(_)
        ));
    }

    #[test]
    fn wrong_round_is_rejected() {
        let fx = Fixture::new();
        let mut collector = fx.collector();
        let mut agreement = fx.agreement(&fx.keys[0], 2, Hash::digest(b"w"));
        agreement.header.round = 99;
        assert!(matches!(
            collector.collect(&agreement).unwrap_err(),
            ConsensusError::WrongRound { .. }
        ));
    }

    #[test]
    fn agreement_on_empty_hash_is_rejected() {
        let fx = Fixture::new();
        let mut collector = fx.collector();
        let agreement = fx.agreement(&fx.keys[0], 2, Hash::ZERO);
        assert!(matches!(
            collector.collect(&agreement).unwrap_err(),
            ConsensusError::Malformed(_)
        ));
    }

    /// An agreement whose StepVotes carry a below-quorum bitset is refused
    /// even when the aggregate itself verifies.
    #[test]
    fn sub_quorum_step_votes_are_rejected() {
        let fx = Fixture::new();
        let mut collector = fx.collector();
        let hash = Hash::digest(b"winner");
        let sender = fx
            .keys
            .iter()
            .find(|k| collector.is_member(&k.bls.public_key(), 2))
            .unwrap();

        // Single-signer StepVotes for step 1.
        let committee = create_voting_committee(&fx.provisioners, &fx.seed, fx.round, 1, 64);
        let signer = &fx.keys[0];
        let index = committee.index_of(&signer.bls.public_key()).unwrap();
        let mut bitset = CommitteeBitset::EMPTY;
        bitset.set(index);
        let signable = ConsensusHeader::signable_vote_bytes(fx.round, 1, &hash);
        let lone = StepVotes::new(signer.bls.sign(&signable), bitset, 1);

        let mut agreement = fx.agreement(sender, 2, hash);
        agreement.votes_per_step[0] = lone;
        assert_eq!(
            collector.collect(&agreement).unwrap_err(),
            ConsensusError::QuorumMiss
        );
    }
}
