//! The ordered, weighted set of stakers participating in consensus.

use crate::{BlsPublicKey, EdPublicKey};
use std::collections::BTreeMap;

/// A single stake. Active in round R iff `start_height <= R < end_height`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Stake {
    pub amount: u64,
    pub start_height: u64,
    pub end_height: u64,
}

impl Stake {
    pub fn new(amount: u64, start_height: u64, end_height: u64) -> Self {
        Self {
            amount,
            start_height,
            end_height,
        }
    }

    pub fn active_at(&self, round: u64) -> bool {
        self.start_height <= round && round < self.end_height
    }
}

/// A staker: a BLS consensus key, the Ed25519 envelope key registered with
/// it, and the stakes backing its committee weight.
#[derive(Clone, Debug)]
pub struct Provisioner {
    pub public_key_bls: BlsPublicKey,
    pub public_key_ed: EdPublicKey,
    pub stakes: Vec<Stake>,
}

impl Provisioner {
    pub fn add_stake(&mut self, stake: Stake) {
        self.stakes.push(stake);
    }

    /// Total stake active at `round`.
    pub fn active_stake(&self, round: u64) -> u64 {
        self.stakes
            .iter()
            .filter(|s| s.active_at(round))
            .map(|s| s.amount)
            .sum()
    }

    /// Remove stakes whose `end_height` is below `round`. Returns the total
    /// amount removed.
    fn remove_expired(&mut self, round: u64) -> u64 {
        let mut removed = 0;
        self.stakes.retain(|s| {
            if s.end_height < round {
                removed += s.amount;
                false
            } else {
                true
            }
        });
        removed
    }
}

/// The provisioner set, ordered lexicographically over BLS key bytes so that
/// every node derives the same committees from the same round state.
#[derive(Clone, Default, Debug)]
pub struct Provisioners {
    members: BTreeMap<BlsPublicKey, Provisioner>,
}

impl Provisioners {
    /// Add a stake for a member, inserting the member if new.
    pub fn add_member(&mut self, bls: BlsPublicKey, ed: EdPublicKey, stake: Stake) {
        self.members
            .entry(bls)
            .or_insert_with(|| Provisioner {
                public_key_bls: bls,
                public_key_ed: ed,
                stakes: Vec::new(),
            })
            .add_stake(stake);
    }

    pub fn remove_member(&mut self, bls: &BlsPublicKey) -> bool {
        self.members.remove(bls).is_some()
    }

    pub fn get(&self, bls: &BlsPublicKey) -> Option<&Provisioner> {
        self.members.get(bls)
    }

    pub fn contains(&self, bls: &BlsPublicKey) -> bool {
        self.members.contains_key(bls)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterate members in deterministic key order.
    pub fn iter(&self) -> impl Iterator<Item = &Provisioner> {
        self.members.values()
    }

    /// Total stake active at `round` across all members.
    pub fn total_weight_at(&self, round: u64) -> u64 {
        self.members.values().map(|m| m.active_stake(round)).sum()
    }

    /// Members with non-zero active stake at `round`, with their weights, in
    /// deterministic key order.
    pub fn eligible_at(&self, round: u64) -> Vec<(BlsPublicKey, u64)> {
        self.members
            .values()
            .filter_map(|m| {
                let w = m.active_stake(round);
                (w > 0).then_some((m.public_key_bls, w))
            })
            .collect()
    }

    /// Drop stakes expired before `round`; members left with no stakes are
    /// removed entirely. Returns the total amount removed.
    pub fn remove_expired(&mut self, round: u64) -> u64 {
        let mut removed = 0;
        self.members.retain(|_, m| {
            removed += m.remove_expired(round);
            !m.stakes.is_empty()
        });
        removed
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_keys;

    fn member(seed: u8) -> (BlsPublicKey, EdPublicKey) {
        let keys = test_keys(seed);
        (keys.bls.public_key(), keys.ed.public_key())
    }

    #[test]
    fn stake_activity_window() {
        let s = Stake::new(100, 5, 10);
        assert!(!s.active_at(4));
        assert!(s.active_at(5));
        assert!(s.active_at(9));
        assert!(!s.active_at(10));
    }

    #[test]
    fn duplicate_member_accumulates_stakes() {
        let (bls, ed) = member(1);
        let mut p = Provisioners::default();
        p.add_member(bls, ed, Stake::new(100, 0, 10));
        p.add_member(bls, ed, Stake::new(50, 0, 10));
        assert_eq!(p.len(), 1);
        assert_eq!(p.total_weight_at(5), 150);
    }

    #[test]
    fn expired_members_are_removed() {
        let (a_bls, a_ed) = member(1);
        let (b_bls, b_ed) = member(2);
        let mut p = Provisioners::default();
        p.add_member(a_bls, a_ed, Stake::new(100, 0, 5));
        p.add_member(b_bls, b_ed, Stake::new(200, 0, 50));

        let removed = p.remove_expired(10);
        assert_eq!(removed, 100);
        assert_eq!(p.len(), 1);
        assert!(!p.contains(&a_bls));
        assert!(p.contains(&b_bls));
    }

    #[test]
    fn iteration_order_is_key_order() {
        let mut p = Provisioners::default();
        for seed in [9u8, 3, 7, 1] {
            let (bls, ed) = member(seed);
            p.add_member(bls, ed, Stake::new(1, 0, 10));
        }
        let keys: Vec<_> = p.iter().map(|m| m.public_key_bls).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn inactive_stake_has_no_weight() {
        let (bls, ed) = member(1);
        let mut p = Provisioners::default();
        p.add_member(bls, ed, Stake::new(100, 8, 20));
        assert_eq!(p.total_weight_at(5), 0);
        assert!(p.eligible_at(5).is_empty());
        assert_eq!(p.total_weight_at(8), 100);
    }
}
