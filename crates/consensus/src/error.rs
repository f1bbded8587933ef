//! Consensus error taxonomy.
//!
//! Message-level errors are logged and the offending message dropped; the
//! consensus loop never terminates on them.

use sba_types::CryptoError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("Sender is not a committee member")]
    NotAMember,
    #[error("Duplicate vote from committee member")]
    DuplicateVote,
    #[error("Invalid signature: {0}")]
    InvalidSignature(#[from] CryptoError),
    #[error("Score does not exceed the selection threshold")]
    ThresholdNotMet,
    #[error("Malformed message: {0}")]
    Malformed(&'static str),
    #[error("Wrong round: got {got}, current {current}")]
    WrongRound { got: u64, current: u64 },
    #[error("Wrong step: got {got}, current {current}")]
    WrongStep { got: u8, current: u8 },
    #[error("Step votes below quorum")]
    QuorumMiss,
    #[error("Empty committee; consensus cannot progress")]
    EmptyCommittee,
    #[error("Score proof verification failed")]
    ProofVerificationFailed,
    #[error("Unknown bid in score subset")]
    UnknownBid,
}
