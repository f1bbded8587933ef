//! Chain error taxonomy.

use sba_types::Hash;
use thiserror::Error;

/// Storage collaborator failures. These propagate to the caller and halt
/// acceptance of the offending block.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Corrupted record: {0}")]
    Corrupted(String),
}

/// Errors from block acceptance and candidate handling.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Block verification failed: {0}")]
    VerificationFailed(&'static str),
    #[error("Certificate verification failed: {0}")]
    InvalidCertificate(&'static str),
    #[error("Unknown candidate block: {0}")]
    UnknownCandidate(Hash),
    #[error("No intermediate block held")]
    MissingIntermediate,
    #[error(transparent)]
    Storage(#[from] StorageError),
}
