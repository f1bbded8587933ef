//! Deterministic genesis state.

use sba_types::{Block, BlockHeader, BlsKeyPair, Certificate, Hash, Seed};

/// Timestamp of the genesis block and of recovery intermediates.
pub const GENESIS_TIMESTAMP: i64 = 1_570_000_000;

fn genesis_generator() -> sba_types::BlsPublicKey {
    // A fixed, publicly known key: genesis carries no real signature.
    BlsKeyPair::from_seed(&[0u8; 32]).public_key()
}

/// The genesis block at height 0. Identical on every node.
pub fn block() -> Block {
    let header = BlockHeader {
        version: 0,
        height: 0,
        timestamp: GENESIS_TIMESTAMP,
        prev_hash: Hash::ZERO,
        seed: Seed::zero(),
        generator: genesis_generator(),
        tx_root: Hash::ZERO,
        state_hash: Hash::digest(b"sba-genesis-state"),
        hash: Hash::ZERO,
        certificate: Certificate::empty(),
    };
    Block::new(header, Vec::new())
}

/// The placeholder intermediate block installed at height 1 during
/// bootstrap and rebuild. Carries a zero seed and the genesis timestamp;
/// its empty certificate is exempt from verification at this height.
pub fn mock_intermediate(genesis: &Block) -> Block {
    let header = BlockHeader {
        version: 0,
        height: 1,
        timestamp: GENESIS_TIMESTAMP,
        prev_hash: genesis.hash(),
        seed: Seed::zero(),
        generator: genesis_generator(),
        tx_root: Hash::ZERO,
        state_hash: genesis.header.state_hash,
        hash: Hash::ZERO,
        certificate: Certificate::empty(),
    };
    Block::new(header, Vec::new())
}
