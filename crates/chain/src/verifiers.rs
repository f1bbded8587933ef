//! Block and certificate verification.

use crate::ChainError;
use sba_types::{
    aggregate_verify, create_voting_committee, Block, ConsensusHeader, Provisioners, Seed,
    StepVotes,
};

/// Stateless sanity checks: the header hash and the transaction root must
/// match the content. Guards the candidate store against a malicious node
/// overwriting the candidate for a given hash.
pub fn sanity_check(block: &Block) -> Result<(), ChainError> {
    if block.header.digest() != block.hash() {
        return Err(ChainError::VerificationFailed("header hash mismatch"));
    }
    if block.calculate_tx_root() != block.header.tx_root {
        return Err(ChainError::VerificationFailed("tx root mismatch"));
    }
    Ok(())
}

/// Full pre-acceptance check of `block` against its predecessor.
pub fn check_block(prev: &Block, block: &Block) -> Result<(), ChainError> {
    sanity_check(block)?;

    if block.header.prev_hash != prev.hash() {
        return Err(ChainError::VerificationFailed("previous hash mismatch"));
    }
    if block.height() != prev.height() + 1 {
        return Err(ChainError::VerificationFailed("height is not sequential"));
    }
    if block.header.timestamp < prev.header.timestamp {
        return Err(ChainError::VerificationFailed("timestamp before predecessor"));
    }

    // The seed must be the generator's signature over the previous seed.
    // Recovery blocks at the base of the chain carry a zero seed.
    if !block.header.seed.is_zero() {
        let signature = block
            .header
            .seed
            .as_signature()
            .map_err(|_| ChainError::VerificationFailed("seed is not a signature"))?;
        block
            .header
            .generator
            .verify(prev.header.seed.as_bytes(), &signature)
            .map_err(|_| ChainError::VerificationFailed("seed signature invalid"))?;
    }

    Ok(())
}

fn check_step_votes(
    votes: &StepVotes,
    round: u64,
    block_hash: &sba_types::Hash,
    seed: &Seed,
    provisioners: &Provisioners,
    committee_size: usize,
    reduction_quorum: f64,
) -> Result<(), ChainError> {
    if votes.is_empty() {
        return Err(ChainError::InvalidCertificate("empty step votes"));
    }
    let committee = create_voting_committee(provisioners, seed, round, votes.step, committee_size);
    if committee.is_empty() {
        return Err(ChainError::InvalidCertificate("empty committee"));
    }
    let keys = committee
        .keys_from_bitset(votes.bitset)
        .ok_or(ChainError::InvalidCertificate("bitset out of range"))?;
    if committee.slots_in_bitset(votes.bitset) <= committee.quorum(reduction_quorum) {
        return Err(ChainError::InvalidCertificate("below quorum"));
    }
    let signable = ConsensusHeader::signable_vote_bytes(round, votes.step, block_hash);
    aggregate_verify(&keys, &signable, &votes.aggregate)
        .map_err(|_| ChainError::InvalidCertificate("aggregate signature invalid"))?;
    Ok(())
}

/// Verify a block's embedded certificate against the provisioner snapshot
/// valid for its height.
///
/// The certificate's two StepVotes were produced by the committees of the
/// round that decided the block (round = height), seeded by the previous
/// block's seed. Both aggregates must verify and both bitsets must exceed
/// the reduction quorum.
pub fn check_certificate(
    block: &Block,
    prev_seed: &Seed,
    provisioners: &Provisioners,
    committee_size: usize,
    reduction_quorum: f64,
) -> Result<(), ChainError> {
    let cert = &block.header.certificate;
    if cert.is_empty() {
        return Err(ChainError::InvalidCertificate("empty certificate"));
    }
    let round = block.height();
    for votes in cert.votes_per_step() {
        check_step_votes(
            &votes,
            round,
            &block.hash(),
            prev_seed,
            provisioners,
            committee_size,
            reduction_quorum,
        )?;
    }
    Ok(())
}
