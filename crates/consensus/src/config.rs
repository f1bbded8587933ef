//! Consensus configuration.

use sba_types::consts::{
    CONSENSUS_MAX_COMMITTEE_SIZE, CONSENSUS_MAX_STEP, CONSENSUS_QUORUM_THRESHOLD,
    CONSENSUS_TIMEOUT, CONSENSUS_TIME_THRESHOLD, MAX_TX_SET_SIZE, REDUCTION_QUORUM_THRESHOLD,
};
use std::time::Duration;

/// Tunables for the round state machine. Defaults are the protocol
/// constants; tests shrink the timeouts.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Base per-phase timeout. Doubles per consecutive failed round.
    pub base_timeout: Duration,
    /// Cap for the doubled timeout.
    pub max_timeout: Duration,
    /// Committee slots for reduction and agreement phases.
    pub committee_size: usize,
    /// Fraction of committee slots required for a reduction quorum
    /// (strictly exceeded).
    pub reduction_quorum: f64,
    /// Fraction of committee slots required for the agreement quorum.
    pub agreement_quorum: f64,
    /// Highest step usable within a round.
    pub max_step: u8,
    /// Serialized transaction budget for candidate blocks.
    pub max_tx_set_size: usize,
    /// Initial selection threshold, big-endian. Scores must exceed it to be
    /// publishable. Halved on a scoreless selection timeout, reset per round.
    pub initial_threshold: [u8; 32],
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        let mut initial_threshold = [0u8; 32];
        initial_threshold[0] = 0x80;
        Self {
            base_timeout: CONSENSUS_TIMEOUT,
            max_timeout: CONSENSUS_TIME_THRESHOLD,
            committee_size: CONSENSUS_MAX_COMMITTEE_SIZE,
            reduction_quorum: REDUCTION_QUORUM_THRESHOLD,
            agreement_quorum: CONSENSUS_QUORUM_THRESHOLD,
            max_step: CONSENSUS_MAX_STEP,
            max_tx_set_size: MAX_TX_SET_SIZE,
            initial_threshold,
        }
    }
}

impl ConsensusConfig {
    /// The phase timeout after `failures` consecutive failed rounds:
    /// `min(2^failures * base, max)`.
    pub fn timeout_for(&self, failures: u32) -> Duration {
        let doubled = self
            .base_timeout
            .checked_mul(1u32 << failures.min(16))
            .unwrap_or(self.max_timeout);
        doubled.min(self.max_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_doubles_and_caps() {
        let config = ConsensusConfig::default();
        assert_eq!(config.timeout_for(0), Duration::from_secs(5));
        assert_eq!(config.timeout_for(1), Duration::from_secs(10));
        assert_eq!(config.timeout_for(2), Duration::from_secs(10));
        assert_eq!(config.timeout_for(10), Duration::from_secs(10));
    }

    #[test]
    fn timeout_resets_with_zero_failures() {
        let config = ConsensusConfig::default();
        assert_eq!(config.timeout_for(0), config.base_timeout);
    }
}
