//! SBA round state machine.
//!
//! This crate implements the per-round consensus pipeline as a synchronous,
//! event-driven state machine:
//!
//! - `Selection` collects blind-bid scores until the phase timeout and picks
//!   the best-scoring candidate.
//! - Two reduction phases converge committee votes on that candidate into
//!   aggregate [`StepVotes`](sba_types::StepVotes).
//! - An agreement collector runs for the whole round, certifying a block
//!   hash once enough agreement messages accumulate.
//!
//! A failed iteration (the agreement wait timing out) starts the next
//! iteration at the following step multiple with a halved score threshold;
//! consecutive failed rounds double the base phase timeout up to a cap.
//!
//! All I/O is performed by the runner via returned `Action`s.

mod agreement;
mod config;
mod error;
mod generator;
mod reduction;
mod score;
mod state;
mod threshold;

pub use agreement::AgreementCollector;
pub use config::ConsensusConfig;
pub use error::ConsensusError;
pub use generator::generate_candidate;
pub use reduction::{Aggregator, AggregatorOutcome};
pub use score::{
    verify_score, BidSecrets, HashProver, HashVerifier, ScoreProver, ScoreRequest, ScoreVerifier,
    SCORE_SUBSET_SIZE,
};
pub use state::{ConsensusState, Phase};
pub use threshold::Threshold;
