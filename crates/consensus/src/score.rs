//! Blind-bid score generation and verification.
//!
//! The zero-knowledge prover is an external collaborator; consensus talks
//! to it through [`ScoreProver`] and [`ScoreVerifier`]. The hash-based
//! implementations here are deterministic stand-ins with the same shape:
//! the proof binds `(score, z, subset, seed)` together, which is what the
//! selection handler checks. A production deployment plugs in the real
//! prover without touching the state machine.

use crate::{ConsensusError, Threshold};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sba_types::{calculate_x, BidList, RoundUpdate, ScoreEvent, ScoreProof, Seed};

const SCORE_DST: &[u8] = b"sba-blind-bid-score";
const Z_DST: &[u8] = b"sba-blind-bid-z";
const PROOF_DST: &[u8] = b"sba-blind-bid-proof";

/// How many bids the subset proof ranges over, when the bid list allows.
pub const SCORE_SUBSET_SIZE: usize = 4;

/// Inputs to one score generation attempt.
#[derive(Debug, Clone)]
pub struct ScoreRequest {
    pub round: u64,
    pub seed: Seed,
    pub bid_list: BidList,
}

/// Produces at most one score per round attempt. Returns `None` when the
/// caller holds no active bid.
pub trait ScoreProver: Send + Sync {
    fn prove(&self, request: &ScoreRequest) -> Option<ScoreProof>;
}

/// Verifies a published score proof against the round seed.
pub trait ScoreVerifier: Send + Sync {
    fn verify(&self, seed: &Seed, event: &ScoreEvent) -> bool;
}

/// The secret parameters of a bid: the committed amount scalar `d`, the
/// secret `k`, and the commitment `m`.
#[derive(Debug, Clone)]
pub struct BidSecrets {
    pub d: [u8; 32],
    pub k: [u8; 32],
    pub m: [u8; 32],
}

impl BidSecrets {
    /// The public X value of this bid.
    pub fn x(&self) -> [u8; 32] {
        calculate_x(&self.d, &self.m)
    }
}

fn binding_proof(score: &[u8; 32], z: &[u8; 32], subset: &[u8], seed: &Seed) -> Vec<u8> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(PROOF_DST);
    hasher.update(score);
    hasher.update(z);
    hasher.update(subset);
    hasher.update(seed.as_bytes());
    hasher.finalize().as_bytes().to_vec()
}

/// Deterministic hash-based prover.
pub struct HashProver {
    secrets: Option<BidSecrets>,
}

impl HashProver {
    pub fn new(secrets: Option<BidSecrets>) -> Self {
        Self { secrets }
    }

    pub fn without_bid() -> Self {
        Self { secrets: None }
    }
}

impl ScoreProver for HashProver {
    fn prove(&self, request: &ScoreRequest) -> Option<ScoreProof> {
        let secrets = self.secrets.as_ref()?;
        let own_x = secrets.x();
        if !request.bid_list.contains(&own_x) {
            // The bid expired or was never accepted on chain.
            return None;
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(SCORE_DST);
        hasher.update(request.seed.as_bytes());
        hasher.update(&secrets.d);
        hasher.update(&secrets.k);
        let score = *hasher.finalize().as_bytes();

        let mut hasher = blake3::Hasher::new();
        hasher.update(Z_DST);
        hasher.update(request.seed.as_bytes());
        hasher.update(&secrets.k);
        let z = *hasher.finalize().as_bytes();

        // Subset selection is seeded from public round data plus the bid
        // secret, so repeated attempts within a round are stable.
        let mut rng_seed = [0u8; 32];
        let mut hasher = blake3::Hasher::new();
        hasher.update(request.seed.as_bytes());
        hasher.update(&secrets.k);
        rng_seed.copy_from_slice(hasher.finalize().as_bytes());
        let mut rng = ChaCha8Rng::from_seed(rng_seed);

        let size = SCORE_SUBSET_SIZE.min(request.bid_list.len());
        let subset = request.bid_list.subset(size, Some(&own_x), &mut rng)?;
        let subset_bytes = BidList::serialize_subset(&subset);

        Some(ScoreProof {
            score,
            proof: binding_proof(&score, &z, &subset_bytes, &request.seed),
            z,
            bid_list_subset: subset_bytes,
        })
    }
}

/// Verifier counterpart of [`HashProver`]: recomputes the binding proof
/// from the public parts.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashVerifier;

impl ScoreVerifier for HashVerifier {
    fn verify(&self, seed: &Seed, event: &ScoreEvent) -> bool {
        binding_proof(&event.score, &event.z, &event.bid_list_subset, seed) == event.proof
    }
}

/// Full selection-side verification of a received score event: threshold,
/// bid subset membership, seed binding and proof.
pub fn verify_score(
    event: &ScoreEvent,
    ru: &RoundUpdate,
    threshold: &Threshold,
    verifier: &dyn ScoreVerifier,
) -> Result<(), ConsensusError> {
    if !threshold.exceeds(&event.score) {
        return Err(ConsensusError::ThresholdNotMet);
    }
    if event.seed != ru.seed || event.prev_hash != ru.prev_hash {
        return Err(ConsensusError::Malformed("score is for a different round state"));
    }
    let subset = BidList::reconstruct_subset(&event.bid_list_subset)
        .map_err(|_| ConsensusError::Malformed("bid subset"))?;
    if subset.is_empty() {
        return Err(ConsensusError::Malformed("empty bid subset"));
    }
    ru.bid_list
        .validate_subset(&subset)
        .map_err(|_| ConsensusError::UnknownBid)?;
    if !verifier.verify(&ru.seed, event) {
        return Err(ConsensusError::ProofVerificationFailed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sba_types::test_utils::test_keys;
    use sba_types::{Bid, ConsensusHeader, Hash, Provisioners};

    fn secrets(seed: u8) -> BidSecrets {
        BidSecrets {
            d: [seed; 32],
            k: [seed.wrapping_add(1); 32],
            m: [seed.wrapping_add(2); 32],
        }
    }

    fn bid_list_with(own: &BidSecrets) -> BidList {
        let mut list = BidList::default();
        list.add_bid(Bid::new(&own.d, &own.m, 1000));
        for i in 10u8..16 {
            list.add_bid(Bid::new(&[i; 32], &[i + 1; 32], 1000));
        }
        list
    }

    fn round_update(bid_list: BidList) -> RoundUpdate {
        RoundUpdate {
            round: 2,
            prev_hash: Hash::digest(b"intermediate"),
            seed: Seed::from_bytes([7; 48]),
            timestamp: 0,
            provisioners: Provisioners::default(),
            bid_list,
            last_certificate_step: 0,
        }
    }

    fn event_from(proof: ScoreProof, ru: &RoundUpdate) -> ScoreEvent {
        ScoreEvent {
            header: ConsensusHeader {
                pub_key_bls: test_keys(1).bls.public_key(),
                round: ru.round,
                step: 0,
                block_hash: Hash::digest(b"candidate"),
            },
            score: proof.score,
            proof: proof.proof,
            z: proof.z,
            bid_list_subset: proof.bid_list_subset,
            seed: ru.seed,
            prev_hash: ru.prev_hash,
        }
    }

    #[test]
    fn prover_without_bid_returns_nothing() {
        let prover = HashProver::without_bid();
        let ru = round_update(BidList::default());
        assert!(prover
            .prove(&ScoreRequest {
                round: ru.round,
                seed: ru.seed,
                bid_list: ru.bid_list,
            })
            .is_none());
    }

    #[test]
    fn prove_then_verify() {
        let own = secrets(1);
        let list = bid_list_with(&own);
        let ru = round_update(list.clone());
        let prover = HashProver::new(Some(own));
        let proof = prover
            .prove(&ScoreRequest {
                round: ru.round,
                seed: ru.seed,
                bid_list: list,
            })
            .unwrap();

        let event = event_from(proof, &ru);
        let threshold = Threshold::new([0u8; 32]);
        assert!(verify_score(&event, &ru, &threshold, &HashVerifier).is_ok());
    }

    #[test]
    fn expired_bid_yields_no_score() {
        let own = secrets(1);
        // Bid list without our bid.
        let mut list = BidList::default();
        list.add_bid(Bid::new(&[9; 32], &[10; 32], 1000));
        let prover = HashProver::new(Some(own));
        assert!(prover
            .prove(&ScoreRequest {
                round: 2,
                seed: Seed::zero(),
                bid_list: list,
            })
            .is_none());
    }

    #[test]
    fn below_threshold_is_rejected() {
        let own = secrets(1);
        let list = bid_list_with(&own);
        let ru = round_update(list.clone());
        let proof = HashProver::new(Some(own))
            .prove(&ScoreRequest {
                round: ru.round,
                seed: ru.seed,
                bid_list: list,
            })
            .unwrap();
        let event = event_from(proof, &ru);

        let threshold = Threshold::new([0xff; 32]);
        assert_eq!(
            verify_score(&event, &ru, &threshold, &HashVerifier),
            Err(ConsensusError::ThresholdNotMet)
        );
    }

    #[test]
    fn tampered_score_fails_proof_check() {
        let own = secrets(1);
        let list = bid_list_with(&own);
        let ru = round_update(list.clone());
        let proof = HashProver::new(Some(own))
            .prove(&ScoreRequest {
                round: ru.round,
                seed: ru.seed,
                bid_list: list,
            })
            .unwrap();
        let mut event = event_from(proof, &ru);
        event.score[0] = event.score[0].wrapping_add(1);

        let threshold = Threshold::new([0u8; 32]);
        assert_eq!(
            verify_score(&event, &ru, &threshold, &HashVerifier),
            Err(ConsensusError::ProofVerificationFailed)
        );
    }

    #[test]
    fn foreign_subset_is_rejected() {
        let own = secrets(1);
        let list = bid_list_with(&own);
        let ru = round_update(list.clone());
        let proof = HashProver::new(Some(own))
            .prove(&ScoreRequest {
                round: ru.round,
                seed: ru.seed,
                bid_list: list,
            })
            .unwrap();
        let mut event = event_from(proof, &ru);
        // Swap in an X value the round's bid list does not contain.
        event.bid_list_subset[..32].copy_from_slice(&[0xee; 32]);

        let threshold = Threshold::new([0u8; 32]);
        assert_eq!(
            verify_score(&event, &ru, &threshold, &HashVerifier),
            Err(ConsensusError::UnknownBid)
        );
    }
}
