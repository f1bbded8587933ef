//! Protocol constants.
//!
//! A single point of constants definition.

use std::time::Duration;

/// One whole unit of the native coin, in atomic units.
pub const COIN: u64 = 1_000_000_000;

/// Default block gas limit.
pub const BLOCK_GAS_LIMIT: u64 = 1000 * COIN;

/// Maximum serialized size of the transaction set in a candidate block.
pub const MAX_TX_SET_SIZE: usize = 825_000;

/// Maximum number of blocks requested/delivered in a single sync session.
pub const MAX_INV_BLOCKS: usize = 500;

/// Maximum block time in seconds.
pub const MAX_BLOCK_TIME: i64 = 360;

/// Protocol-based consensus step time.
pub const CONSENSUS_TIMEOUT: Duration = Duration::from_secs(5);

/// Consensus step time above which the timeout no longer doubles.
pub const CONSENSUS_TIME_THRESHOLD: Duration = Duration::from_secs(10);

/// Agreement quorum fraction of the committee.
pub const CONSENSUS_QUORUM_THRESHOLD: f64 = 0.67;

/// Reduction quorum fraction of the committee.
pub const REDUCTION_QUORUM_THRESHOLD: f64 = 0.75;

/// Maximum consensus step number within a round.
pub const CONSENSUS_MAX_STEP: u8 = 213;

/// Maximum size of the committee in reduction and agreement phases.
pub const CONSENSUS_MAX_COMMITTEE_SIZE: usize = 64;

/// Maximum size of the committee in the selection phase.
pub const CONSENSUS_SELECTION_MAX_COMMITTEE_SIZE: usize = 1;

/// Steps consumed by one iteration: selection, two reductions, agreement wait.
pub const STEPS_PER_ITERATION: u8 = 4;

/// Rounds between a stake transaction being accepted and the stake becoming
/// active. Reflects the two-round consensus pipeline depth.
pub const STAKE_ACTIVATION_OFFSET: u64 = 2;

/// Block generator coinbase reward.
pub const GENERATOR_REWARD: u64 = 50 * COIN;

/// The node executable version.
pub const NODE_VERSION: &str = "0.1.0";
