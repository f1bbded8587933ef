//! Shared builders for simulation tests.
//!
//! The helpers forge the artefacts honest committees would produce: fully
//! signed certificates and certified blocks, chained so that each block's
//! certificate verifies against the committees seeded by its predecessor.

use sba_types::{
    create_voting_committee, Block, BlockHeader, BlsSignature, Certificate, CommitteeBitset,
    ConsensusHeader, Hash, NodeKeys, Provisioners, Seed, StepVotes, Transaction,
};

/// Deterministic node keys for simulations.
pub fn sim_keys(index: u8) -> NodeKeys {
    let mut seed = [0u8; 32];
    seed[0] = index;
    seed[1] = 0xa5;
    NodeKeys::from_seed(&seed)
}

/// StepVotes for `(round, step, hash)` signed by every key that sits in
/// the step committee.
pub fn full_step_votes(
    provisioners: &Provisioners,
    keys: &[NodeKeys],
    seed: &Seed,
    round: u64,
    step: u8,
    hash: Hash,
    committee_size: usize,
) -> StepVotes {
    let committee = create_voting_committee(provisioners, seed, round, step, committee_size);
    let signable = ConsensusHeader::signable_vote_bytes(round, step, &hash);
    let mut bitset = CommitteeBitset::EMPTY;
    let mut aggregate = BlsSignature::identity();
    for k in keys {
        if let Some(index) = committee.index_of(&k.bls.public_key()) {
            bitset.set(index);
            aggregate = aggregate.combine(&k.bls.sign(&signable));
        }
    }
    StepVotes::new(aggregate, bitset, step)
}

/// Build a block on `prev` with a fully signed certificate at steps (1, 2)
/// of round `prev.height + 1`.
pub fn certified_block(
    prev: &Block,
    provisioners: &Provisioners,
    keys: &[NodeKeys],
    txs: Vec<Transaction>,
    committee_size: usize,
) -> Block {
    let generator = &keys[0];
    let round = prev.height() + 1;
    let header = BlockHeader {
        version: 0,
        height: round,
        timestamp: prev.header.timestamp + 10,
        prev_hash: prev.hash(),
        seed: Seed::from_signature(&generator.bls.sign(prev.header.seed.as_bytes())),
        generator: generator.bls.public_key(),
        tx_root: Hash::ZERO,
        state_hash: prev.header.state_hash,
        hash: Hash::ZERO,
        certificate: Certificate::empty(),
    };
    let mut block = Block::new(header, txs);

    let seed = prev.header.seed;
    let first = full_step_votes(
        provisioners,
        keys,
        &seed,
        round,
        1,
        block.hash(),
        committee_size,
    );
    let second = full_step_votes(
        provisioners,
        keys,
        &seed,
        round,
        2,
        block.hash(),
        committee_size,
    );
    block.header.certificate = Certificate::from_votes(&first, &second);
    block
}
