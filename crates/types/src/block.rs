//! Blocks, headers and certificates.

use crate::{BlsPublicKey, BlsSignature, CommitteeBitset, Hash, Seed, StepVotes, Transaction};

const HEADER_HASH_DST: &[u8] = b"sba-block-header";
const TX_LEAF_DST: &[u8] = b"sba-tx-leaf";
const TX_NODE_DST: &[u8] = b"sba-tx-node";

/// The quorum certificate attached to a block header: the two reduction
/// StepVotes of the round that decided the block.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Certificate {
    pub step_one_seal: BlsSignature,
    pub step_two_seal: BlsSignature,
    pub step_one_bitset: CommitteeBitset,
    pub step_two_bitset: CommitteeBitset,
    /// The second reduction step of the winning iteration.
    pub step: u8,
}

impl Certificate {
    /// The placeholder carried by candidates and unfinalised blocks.
    pub fn empty() -> Self {
        Self {
            step_one_seal: BlsSignature::identity(),
            step_two_seal: BlsSignature::identity(),
            step_one_bitset: CommitteeBitset::EMPTY,
            step_two_bitset: CommitteeBitset::EMPTY,
            step: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.step_one_bitset.is_empty() && self.step_two_bitset.is_empty()
    }

    /// Assemble a certificate from the two reduction StepVotes of an
    /// iteration. `second.step` becomes the certificate step.
    pub fn from_votes(first: &StepVotes, second: &StepVotes) -> Self {
        Self {
            step_one_seal: first.aggregate,
            step_two_seal: second.aggregate,
            step_one_bitset: first.bitset,
            step_two_bitset: second.bitset,
            step: second.step,
        }
    }

    /// The StepVotes view of each half, for verification.
    pub fn votes_per_step(&self) -> [StepVotes; 2] {
        [
            StepVotes::new(self.step_one_seal, self.step_one_bitset, self.step.wrapping_sub(1)),
            StepVotes::new(self.step_two_seal, self.step_two_bitset, self.step),
        ]
    }
}

/// A block header.
#[derive(Clone, PartialEq, Debug)]
pub struct BlockHeader {
    pub version: u8,
    pub height: u64,
    /// Unix seconds.
    pub timestamp: i64,
    pub prev_hash: Hash,
    /// The generator's BLS signature over the previous block's seed.
    pub seed: Seed,
    pub generator: BlsPublicKey,
    pub tx_root: Hash,
    pub state_hash: Hash,
    /// Content hash over the fields above. Zero until sealed.
    pub hash: Hash,
    /// Certificate of the round that decided this block. Empty on
    /// candidates; attached at decision time.
    pub certificate: Certificate,
}

impl BlockHeader {
    /// Domain-separated hash over the serialized header, excluding the hash
    /// and certificate fields.
    pub fn digest(&self) -> Hash {
        let mut bytes = Vec::with_capacity(256);
        bytes.extend_from_slice(HEADER_HASH_DST);
        bytes.push(self.version);
        bytes.extend_from_slice(&self.height.to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(self.prev_hash.as_bytes());
        bytes.extend_from_slice(self.seed.as_bytes());
        bytes.extend_from_slice(&self.generator.to_bytes());
        bytes.extend_from_slice(self.tx_root.as_bytes());
        bytes.extend_from_slice(self.state_hash.as_bytes());
        Hash::digest(&bytes)
    }
}

/// A block: header plus transactions.
#[derive(Clone, PartialEq, Debug)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Transaction>,
}

impl Block {
    /// Build a block, sealing the transaction root and header hash.
    pub fn new(mut header: BlockHeader, txs: Vec<Transaction>) -> Self {
        header.tx_root = tx_root(&txs);
        header.hash = header.digest();
        Self { header, txs }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Recompute the transaction merkle root.
    pub fn calculate_tx_root(&self) -> Hash {
        tx_root(&self.txs)
    }
}

/// Merkle root over transaction hashes. Odd levels duplicate the trailing
/// node; the empty set roots to zero.
pub fn tx_root(txs: &[Transaction]) -> Hash {
    if txs.is_empty() {
        return Hash::ZERO;
    }
    let mut level: Vec<Hash> = txs
        .iter()
        .map(|tx| {
            let mut leaf = Vec::with_capacity(TX_LEAF_DST.len() + 32);
            leaf.extend_from_slice(TX_LEAF_DST);
            leaf.extend_from_slice(tx.hash().as_bytes());
            Hash::digest(&leaf)
        })
        .collect();

    while level.len() > 1 {
        if level.len() % 2 != 0 {
            level.push(*level.last().unwrap());
        }
        level = level
            .chunks_exact(2)
            .map(|pair| {
                let mut node = Vec::with_capacity(TX_NODE_DST.len() + 64);
                node.extend_from_slice(TX_NODE_DST);
                node.extend_from_slice(pair[0].as_bytes());
                node.extend_from_slice(pair[1].as_bytes());
                Hash::digest(&node)
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_keys;
    use crate::Transaction;

    fn header(height: u64) -> BlockHeader {
        BlockHeader {
            version: 0,
            height,
            timestamp: 1_000,
            prev_hash: Hash::digest(b"prev"),
            seed: Seed::zero(),
            generator: test_keys(1).bls.public_key(),
            tx_root: Hash::ZERO,
            state_hash: Hash::digest(b"state"),
            hash: Hash::ZERO,
            certificate: Certificate::empty(),
        }
    }

    #[test]
    fn hash_excludes_certificate() {
        let txs = vec![Transaction::transfer(vec![1])];
        let mut a = Block::new(header(1), txs.clone());
        let before = a.hash();
        a.header.certificate = Certificate {
            step_one_seal: BlsSignature::identity(),
            step_two_seal: BlsSignature::identity(),
            step_one_bitset: CommitteeBitset::from_bits(0b111),
            step_two_bitset: CommitteeBitset::from_bits(0b111),
            step: 2,
        };
        assert_eq!(a.header.digest(), before);
    }

    #[test]
    fn hash_covers_header_fields() {
        let a = Block::new(header(1), vec![]);
        let b = Block::new(header(2), vec![]);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn tx_root_changes_with_content() {
        let a = Block::new(header(1), vec![Transaction::transfer(vec![1])]);
        let b = Block::new(header(1), vec![Transaction::transfer(vec![2])]);
        assert_ne!(a.header.tx_root, b.header.tx_root);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn empty_tx_root_is_zero() {
        assert_eq!(tx_root(&[]), Hash::ZERO);
    }

    #[test]
    fn odd_tx_count_roots() {
        let txs: Vec<_> = (0u8..3).map(|i| Transaction::transfer(vec![i])).collect();
        let root = tx_root(&txs);
        assert!(!root.is_zero());
        assert_eq!(root, tx_root(&txs));
    }

    #[test]
    fn certificate_votes_per_step() {
        let sv1 = StepVotes::empty(1);
        let sv2 = StepVotes::empty(2);
        let cert = Certificate::from_votes(&sv1, &sv2);
        assert_eq!(cert.step, 2);
        let [a, b] = cert.votes_per_step();
        assert_eq!(a.step, 1);
        assert_eq!(b.step, 2);
    }
}
