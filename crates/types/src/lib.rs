//! Core types for SBA consensus.
//!
//! This crate provides the foundational types used throughout the consensus
//! implementation:
//!
//! - **Primitives**: Hash, BLS and Ed25519 keys and signatures, seeds
//! - **Staking**: Provisioner set, stakes, blind bids
//! - **Sortition**: deterministic voting committee extraction
//! - **Consensus types**: Block, BlockHeader, Certificate, StepVotes
//! - **Messages**: consensus header and payloads (Reduction, Agreement, Score)
//!
//! # Design Philosophy
//!
//! This crate is self-contained and does not depend on any other workspace
//! crates, making it the foundation layer.

mod bid;
mod bitset;
mod block;
pub mod consts;
mod crypto;
mod hash;
mod payload;
mod provisioners;
mod round;
pub mod sortition;
mod step_votes;
mod transaction;

pub use bid::{Bid, BidError, BidList};
pub use bitset::CommitteeBitset;
pub use block::{Block, BlockHeader, Certificate};
pub use crypto::{
    aggregate_verify, calculate_x, hash_to_scalar, BlsKeyPair, BlsPublicKey, BlsSignature,
    CryptoError, EdKeyPair, EdPublicKey, EdSignature, NodeKeys, Seed, BLS_PUBLIC_KEY_SIZE,
    BLS_SIGNATURE_SIZE, ED25519_PUBLIC_KEY_SIZE, ED25519_SIGNATURE_SIZE, SEED_SIZE,
};
pub use hash::{Hash, HexError};
pub use payload::{Agreement, ConsensusHeader, Reduction, ScoreEvent, ScoreProof};
pub use provisioners::{Provisioner, Provisioners, Stake};
pub use round::RoundUpdate;
pub use sortition::{create_voting_committee, Committee};
pub use step_votes::StepVotes;
pub use transaction::{Transaction, TransactionPayload};

/// Test utilities shared by downstream crates.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;

    /// Deterministic node keys derived from a seed byte.
    pub fn test_keys(seed: u8) -> NodeKeys {
        let mut bytes = [0u8; 32];
        bytes[0] = seed;
        bytes[1] = seed.wrapping_add(1);
        NodeKeys::from_seed(&bytes)
    }

    /// A provisioner set of `n` members with equal stakes active until
    /// `end_height`.
    pub fn test_provisioners(n: u8, amount: u64, end_height: u64) -> (Provisioners, Vec<NodeKeys>) {
        let keys: Vec<NodeKeys> = (0..n).map(test_keys).collect();
        let mut provisioners = Provisioners::default();
        for k in &keys {
            provisioners.add_member(
                k.bls.public_key(),
                k.ed.public_key(),
                Stake::new(amount, 0, end_height),
            );
        }
        (provisioners, keys)
    }
}
