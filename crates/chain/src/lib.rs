//! Chain acceptance pipeline.
//!
//! The chain acceptor owns the canonical chain state: the last accepted
//! block, the intermediate block decided by the previous round, the
//! provisioner set and bid list. It verifies blocks and certificates,
//! persists accepted blocks, rotates consensus participants, and emits the
//! round updates that drive the consensus state machine.
//!
//! The synchroniser rides along: it tracks how far behind the node is,
//! pauses consensus while catching up, and falls back to a round-results
//! query for the final missing block plus certificate.

mod acceptor;
mod candidates;
mod error;
pub mod genesis;
mod store;
mod sync;
pub mod verifiers;

pub use acceptor::{Chain, TipSnapshot};
pub use candidates::CandidateStore;
pub use error::{ChainError, StorageError};
pub use store::{BlockStore, MemoryStore};
pub use sync::Synchroniser;
