//! Transactions carried by blocks.
//!
//! Consensus only inspects the stake and bid payloads (they rotate the
//! provisioner set and bid list on acceptance); everything else is opaque
//! mempool content.

use crate::{BlsPublicKey, EdPublicKey, Hash};

/// Transaction payload variants.
#[derive(Clone, PartialEq, Debug)]
pub enum TransactionPayload {
    /// Opaque value transfer, validated by the execution layer.
    Transfer { raw: Vec<u8> },
    /// Locks `amount` as consensus stake for `lock` rounds.
    Stake {
        amount: u64,
        lock: u64,
        public_key_bls: BlsPublicKey,
        public_key_ed: EdPublicKey,
    },
    /// Registers a blind bid: the commitment `m` plus the committed amount
    /// scalar `d`, locked for `lock` rounds.
    Bid { d: [u8; 32], m: [u8; 32], lock: u64 },
    /// Block generator reward. Always the first transaction of a block.
    Coinbase {
        reward: u64,
        generator: BlsPublicKey,
    },
}

/// A transaction.
#[derive(Clone, PartialEq, Debug)]
pub struct Transaction {
    pub payload: TransactionPayload,
}

impl Transaction {
    pub fn transfer(raw: Vec<u8>) -> Self {
        Self {
            payload: TransactionPayload::Transfer { raw },
        }
    }

    pub fn stake(amount: u64, lock: u64, bls: BlsPublicKey, ed: EdPublicKey) -> Self {
        Self {
            payload: TransactionPayload::Stake {
                amount,
                lock,
                public_key_bls: bls,
                public_key_ed: ed,
            },
        }
    }

    pub fn bid(d: [u8; 32], m: [u8; 32], lock: u64) -> Self {
        Self {
            payload: TransactionPayload::Bid { d, m, lock },
        }
    }

    pub fn coinbase(reward: u64, generator: BlsPublicKey) -> Self {
        Self {
            payload: TransactionPayload::Coinbase { reward, generator },
        }
    }

    /// Canonical little-endian encoding, shared by hashing and the wire.
    pub fn write_canonical(&self, out: &mut Vec<u8>) {
        match &self.payload {
            TransactionPayload::Transfer { raw } => {
                out.push(0);
                out.extend_from_slice(&(raw.len() as u32).to_le_bytes());
                out.extend_from_slice(raw);
            }
            TransactionPayload::Stake {
                amount,
                lock,
                public_key_bls,
                public_key_ed,
            } => {
                out.push(1);
                out.extend_from_slice(&amount.to_le_bytes());
                out.extend_from_slice(&lock.to_le_bytes());
                out.extend_from_slice(&public_key_bls.to_bytes());
                out.extend_from_slice(&public_key_ed.to_bytes());
            }
            TransactionPayload::Bid { d, m, lock } => {
                out.push(2);
                out.extend_from_slice(d);
                out.extend_from_slice(m);
                out.extend_from_slice(&lock.to_le_bytes());
            }
            TransactionPayload::Coinbase { reward, generator } => {
                out.push(3);
                out.extend_from_slice(&reward.to_le_bytes());
                out.extend_from_slice(&generator.to_bytes());
            }
        }
    }

    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_canonical(&mut out);
        out
    }

    /// Serialized size, used against the block transaction set budget.
    pub fn serialized_size(&self) -> usize {
        self.to_canonical_bytes().len()
    }

    pub fn hash(&self) -> Hash {
        Hash::digest(&self.to_canonical_bytes())
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self.payload, TransactionPayload::Coinbase { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_keys;

    #[test]
    fn hash_is_payload_sensitive() {
        let a = Transaction::transfer(vec![1, 2, 3]);
        let b = Transaction::transfer(vec![1, 2, 4]);
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), Transaction::transfer(vec![1, 2, 3]).hash());
    }

    #[test]
    fn variants_have_distinct_tags() {
        let keys = test_keys(1);
        let stake = Transaction::stake(10, 5, keys.bls.public_key(), keys.ed.public_key());
        let bid = Transaction::bid([1; 32], [2; 32], 5);
        assert_ne!(stake.hash(), bid.hash());
        assert_eq!(stake.to_canonical_bytes()[0], 1);
        assert_eq!(bid.to_canonical_bytes()[0], 2);
    }
}
