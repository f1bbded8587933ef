//! Deterministic sortition.
//!
//! Extracts a voting committee from the provisioner set for a given
//! `(round, step)`. Every draw derives a pseudorandom scalar from
//! `(seed, round, step, counter)`, reduces it modulo the total active
//! stake, and walks the prefix sums of the lexicographically ordered
//! eligible provisioners to find the member covering that point. A member
//! drawn more than once occupies multiple committee slots.
//!
//! The extraction is a pure function of the round state, so all honest
//! nodes derive identical committees and vote counts.

use crate::{BlsPublicKey, CommitteeBitset, Provisioners, Seed};
use std::collections::BTreeMap;

/// A voting committee: members in deterministic key order with the number
/// of slots each occupies. The sum of slots is the committee size used for
/// quorum arithmetic; member indices are the bit positions of the 64-bit
/// committee bitset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Committee {
    members: Vec<(BlsPublicKey, usize)>,
}

impl Committee {
    /// An empty committee. Consensus cannot progress with one; the round
    /// stalls until a new round update arrives.
    pub fn empty() -> Self {
        Self {
            members: Vec::new(),
        }
    }

    /// Total slots across all members.
    pub fn total_slots(&self) -> usize {
        self.members.iter().map(|(_, n)| n).sum()
    }

    /// Number of distinct members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Bit index of a member key, if present.
    pub fn index_of(&self, key: &BlsPublicKey) -> Option<usize> {
        self.members.iter().position(|(k, _)| k == key)
    }

    pub fn is_member(&self, key: &BlsPublicKey) -> bool {
        self.index_of(key).is_some()
    }

    /// Slots occupied by a member; zero when absent.
    pub fn slots(&self, key: &BlsPublicKey) -> usize {
        self.members
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    /// Members in index order.
    pub fn members(&self) -> impl Iterator<Item = &(BlsPublicKey, usize)> {
        self.members.iter()
    }

    /// Reconstruct the member keys selected by a bitset, in index order.
    /// Returns `None` if the bitset references an index out of range.
    pub fn keys_from_bitset(&self, bitset: CommitteeBitset) -> Option<Vec<BlsPublicKey>> {
        let mut keys = Vec::with_capacity(bitset.count());
        for idx in bitset.indices() {
            keys.push(self.members.get(idx)?.0);
        }
        Some(keys)
    }

    /// Total slots covered by a bitset. Out-of-range bits contribute zero.
    pub fn slots_in_bitset(&self, bitset: CommitteeBitset) -> usize {
        bitset
            .indices()
            .filter_map(|idx| self.members.get(idx))
            .map(|(_, n)| n)
            .sum()
    }

    /// Reduction quorum: strictly more than `rate` of the committee slots
    /// must vote for a StepVotes to be emitted.
    pub fn quorum(&self, rate: f64) -> usize {
        (self.total_slots() as f64 * rate) as usize
    }
}

/// One pseudorandom draw: `H(seed ‖ round ‖ step ‖ counter)` reduced modulo
/// the total weight.
fn draw(seed: &Seed, round: u64, step: u8, counter: u32, total_weight: u64) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(seed.as_bytes());
    hasher.update(&round.to_le_bytes());
    hasher.update(&[step]);
    hasher.update(&counter.to_le_bytes());
    let digest = hasher.finalize();
    let bytes: [u8; 16] = digest.as_bytes()[..16].try_into().unwrap();
    (u128::from_le_bytes(bytes) % total_weight as u128) as u64
}

/// Extract the voting committee for `(round, step)`.
///
/// `size` caps the number of slots drawn. A zero total weight (or an empty
/// provisioner set) yields an empty committee.
pub fn create_voting_committee(
    provisioners: &Provisioners,
    seed: &Seed,
    round: u64,
    step: u8,
    size: usize,
) -> Committee {
    let eligible = provisioners.eligible_at(round);
    let total_weight: u64 = eligible.iter().map(|(_, w)| w).sum();
    if total_weight == 0 || size == 0 {
        return Committee::empty();
    }

    let mut slots: BTreeMap<BlsPublicKey, usize> = BTreeMap::new();
    for counter in 0..size as u32 {
        let point = draw(seed, round, step, counter, total_weight);

        // Walk the prefix sums; a tie on a boundary maps to the
        // lower-indexed provisioner because the comparison is strict.
        let mut cursor = 0u64;
        for (key, weight) in &eligible {
            cursor += weight;
            if point < cursor {
                *slots.entry(*key).or_insert(0) += 1;
                break;
            }
        }
    }

    Committee {
        members: slots.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::CONSENSUS_MAX_COMMITTEE_SIZE;
    use crate::test_utils::test_provisioners;

    fn seed() -> Seed {
        Seed::from_bytes([0x11; 48])
    }

    #[test]
    fn deterministic_across_calls() {
        let (provisioners, _) = test_provisioners(5, 1000, 1000);
        let a = create_voting_committee(&provisioners, &seed(), 7, 2, 64);
        let b = create_voting_committee(&provisioners, &seed(), 7, 2, 64);
        assert_eq!(a, b);
        assert_eq!(a.total_slots(), 64);
    }

    #[test]
    fn differs_by_step() {
        let (provisioners, _) = test_provisioners(5, 1000, 1000);
        let a = create_voting_committee(&provisioners, &seed(), 7, 1, 64);
        let b = create_voting_committee(&provisioners, &seed(), 7, 2, 64);
        // Same members (everyone is heavily staked) but slot distributions
        // should differ between steps with overwhelming probability.
        assert_ne!(a, b);
    }

    #[test]
    fn zero_weight_yields_empty_committee() {
        let provisioners = Provisioners::default();
        let c = create_voting_committee(&provisioners, &seed(), 1, 1, 64);
        assert!(c.is_empty());
        assert_eq!(c.total_slots(), 0);
    }

    #[test]
    fn expired_stakes_are_excluded() {
        let (provisioners, _) = test_provisioners(3, 1000, 10);
        let c = create_voting_committee(&provisioners, &seed(), 50, 1, 64);
        assert!(c.is_empty());
    }

    #[test]
    fn slots_sum_to_committee_size() {
        let (provisioners, _) = test_provisioners(5, 1000, 1000);
        let c = create_voting_committee(
            &provisioners,
            &seed(),
            1,
            1,
            CONSENSUS_MAX_COMMITTEE_SIZE,
        );
        assert_eq!(c.total_slots(), CONSENSUS_MAX_COMMITTEE_SIZE);
        assert!(c.member_count() <= 5);
    }

    #[test]
    fn stake_weight_biases_selection() {
        use crate::test_utils::test_keys;
        use crate::Stake;

        let heavy = test_keys(1);
        let light = test_keys(2);
        let mut provisioners = Provisioners::default();
        provisioners.add_member(
            heavy.bls.public_key(),
            heavy.ed.public_key(),
            Stake::new(1_000_000, 0, 1000),
        );
        provisioners.add_member(
            light.bls.public_key(),
            light.ed.public_key(),
            Stake::new(1, 0, 1000),
        );

        let c = create_voting_committee(&provisioners, &seed(), 1, 1, 64);
        assert!(c.slots(&heavy.bls.public_key()) > c.slots(&light.bls.public_key()));
    }

    #[test]
    fn bitset_roundtrip() {
        let (provisioners, _) = test_provisioners(5, 1000, 1000);
        let c = create_voting_committee(&provisioners, &seed(), 1, 1, 64);

        let mut bitset = CommitteeBitset::default();
        bitset.set(0);
        bitset.set(c.member_count() - 1);
        let keys = c.keys_from_bitset(bitset).unwrap();
        assert_eq!(keys.len(), bitset.count());
        assert_eq!(c.index_of(&keys[0]), Some(0));

        let mut out_of_range = CommitteeBitset::default();
        out_of_range.set(63);
        assert!(c.member_count() < 64);
        assert!(c.keys_from_bitset(out_of_range).is_none());
    }

    #[test]
    fn quorum_is_floor_of_rate() {
        let (provisioners, _) = test_provisioners(5, 1000, 1000);
        let c = create_voting_committee(&provisioners, &seed(), 1, 1, 64);
        assert_eq!(c.quorum(0.75), 48);
    }
}
