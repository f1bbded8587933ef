//! Blind-bid commitments used by block generators.

use crate::crypto::calculate_x;
use thiserror::Error;

/// Errors from bid list handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BidError {
    #[error("Malformed bid list: length {0} is not a multiple of 32")]
    Malformed(usize),
    #[error("Bid subset contains an unknown X value")]
    UnknownBid,
}

/// A blind bid: the X value derived from the committed amount and the
/// commitment M, plus the height at which the bid expires.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Bid {
    pub x: [u8; 32],
    pub m: [u8; 32],
    pub end_height: u64,
}

impl Bid {
    /// Derive a bid from the amount scalar `d` and commitment `m`.
    pub fn new(d: &[u8; 32], m: &[u8; 32], end_height: u64) -> Self {
        Self {
            x: calculate_x(d, m),
            m: *m,
            end_height,
        }
    }

    pub fn expired_at(&self, round: u64) -> bool {
        self.end_height < round
    }
}

/// The ordered list of active bids. Bids are unique by X.
#[derive(Clone, Default, Debug)]
pub struct BidList(Vec<Bid>);

impl BidList {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bid> {
        self.0.iter()
    }

    pub fn contains(&self, x: &[u8; 32]) -> bool {
        self.0.iter().any(|b| &b.x == x)
    }

    /// Append a bid unless one with the same X is already present.
    pub fn add_bid(&mut self, bid: Bid) {
        if !self.contains(&bid.x) {
            self.0.push(bid);
        }
    }

    pub fn remove_bid(&mut self, x: &[u8; 32]) {
        self.0.retain(|b| &b.x != x);
    }

    /// Drop bids expired before `round`.
    pub fn remove_expired(&mut self, round: u64) {
        self.0.retain(|b| !b.expired_at(round));
    }

    /// A random subset of `amount` X values, including `own` when provided.
    /// Returns `None` when the list is too small to fill the subset.
    pub fn subset<R: rand::Rng>(
        &self,
        amount: usize,
        own: Option<&[u8; 32]>,
        rng: &mut R,
    ) -> Option<Vec<[u8; 32]>> {
        if self.0.len() < amount {
            return None;
        }
        let mut xs: Vec<[u8; 32]> = self.0.iter().map(|b| b.x).collect();
        // Fisher-Yates, bounded by the subset size.
        for i in 0..amount {
            let j = rng.gen_range(i..xs.len());
            xs.swap(i, j);
        }
        let mut subset: Vec<[u8; 32]> = xs.into_iter().take(amount).collect();
        if let Some(own) = own {
            if !subset.contains(own) {
                if !self.contains(own) {
                    return None;
                }
                subset[0] = *own;
            }
        }
        Some(subset)
    }

    /// Check that every X in `subset` refers to a known active bid.
    pub fn validate_subset(&self, subset: &[[u8; 32]]) -> Result<(), BidError> {
        for x in subset {
            if !self.contains(x) {
                return Err(BidError::UnknownBid);
            }
        }
        Ok(())
    }

    /// Rebuild a subset from its serialized form: a concatenation of 32-byte
    /// X values.
    pub fn reconstruct_subset(bytes: &[u8]) -> Result<Vec<[u8; 32]>, BidError> {
        if bytes.len() % 32 != 0 {
            return Err(BidError::Malformed(bytes.len()));
        }
        Ok(bytes
            .chunks_exact(32)
            .map(|c| {
                let mut x = [0u8; 32];
                x.copy_from_slice(c);
                x
            })
            .collect())
    }

    /// Serialize a subset as concatenated X values.
    pub fn serialize_subset(subset: &[[u8; 32]]) -> Vec<u8> {
        let mut out = Vec::with_capacity(subset.len() * 32);
        for x in subset {
            out.extend_from_slice(x);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn bid(seed: u8, end_height: u64) -> Bid {
        Bid::new(&[seed; 32], &[seed.wrapping_add(1); 32], end_height)
    }

    #[test]
    fn duplicate_x_is_ignored() {
        let mut list = BidList::default();
        list.add_bid(bid(1, 100));
        list.add_bid(bid(1, 200));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn expiry() {
        let mut list = BidList::default();
        list.add_bid(bid(1, 5));
        list.add_bid(bid(2, 50));
        list.remove_expired(10);
        assert_eq!(list.len(), 1);
        assert!(list.contains(&bid(2, 50).x));
    }

    #[test]
    fn subset_includes_own_bid() {
        let mut list = BidList::default();
        for i in 0..8 {
            list.add_bid(bid(i, 100));
        }
        let own = bid(3, 100).x;
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let subset = list.subset(4, Some(&own), &mut rng).unwrap();
        assert_eq!(subset.len(), 4);
        assert!(subset.contains(&own));
        assert!(list.validate_subset(&subset).is_ok());
    }

    #[test]
    fn subset_too_small() {
        let mut list = BidList::default();
        list.add_bid(bid(1, 100));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(list.subset(4, None, &mut rng).is_none());
    }

    #[test]
    fn reconstruct_rejects_bad_length() {
        assert_eq!(
            BidList::reconstruct_subset(&[0u8; 33]),
            Err(BidError::Malformed(33))
        );
        let xs = BidList::reconstruct_subset(&[0u8; 64]).unwrap();
        assert_eq!(xs.len(), 2);
    }

    #[test]
    fn validate_rejects_unknown() {
        let mut list = BidList::default();
        list.add_bid(bid(1, 100));
        assert_eq!(
            list.validate_subset(&[[9u8; 32]]),
            Err(BidError::UnknownBid)
        );
    }

    #[test]
    fn serialize_roundtrip() {
        let subset = vec![[1u8; 32], [2u8; 32]];
        let bytes = BidList::serialize_subset(&subset);
        assert_eq!(BidList::reconstruct_subset(&bytes).unwrap(), subset);
    }
}
