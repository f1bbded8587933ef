//! Round state handed to consensus at every round boundary.

use crate::{BidList, Hash, Provisioners, Seed};

/// A snapshot of everything the consensus components need for one round.
/// Emitted by the chain on round transitions and immutable for the round's
/// duration.
#[derive(Clone, Debug)]
pub struct RoundUpdate {
    pub round: u64,
    /// Hash of the block candidates must extend (the intermediate block).
    pub prev_hash: Hash,
    /// Seed of that block, input to sortition and score generation.
    pub seed: Seed,
    /// Its timestamp, lower bound for candidate timestamps.
    pub timestamp: i64,
    pub provisioners: Provisioners,
    pub bid_list: BidList,
    /// Certificate step of the last finalised round.
    pub last_certificate_step: u8,
}
