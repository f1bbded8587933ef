//! Synchroniser state.
//!
//! Tracks the highest height announced by peers. While the node is more
//! than one block behind, consensus is paused; the gap is filled with
//! full blocks, and the final missing block plus certificate comes from a
//! round-results query with a response deadline.

use tracing::debug;

/// What the chain should do after feeding the synchroniser an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Nothing to do.
    None,
    /// We fell behind: pause consensus.
    StopConsensus,
    /// One block short of the target: query round results for this round.
    RequestRoundResults { round: u64 },
}

/// Sync bookkeeping. All heights are chain heights of accepted blocks.
#[derive(Debug, Default)]
pub struct Synchroniser {
    highest_seen: u64,
    /// Consensus pause already requested for the current catch-up.
    stop_sent: bool,
    /// Round of the outstanding round-results query, if any.
    pending_request: Option<u64>,
}

impl Synchroniser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn highest_seen(&self) -> u64 {
        self.highest_seen
    }

    /// Blocks between the accepted tip and the highest announced height.
    pub fn counter(&self, current_height: u64) -> u64 {
        self.highest_seen.saturating_sub(current_height)
    }

    pub fn is_syncing(&self, current_height: u64) -> bool {
        self.counter(current_height) > 0
    }

    pub fn pending_request(&self) -> Option<u64> {
        self.pending_request
    }

    /// A peer announced `height`.
    pub fn on_peer_height(&mut self, height: u64, current_height: u64) -> SyncDecision {
        if height > self.highest_seen {
            self.highest_seen = height;
        }
        self.decide(current_height)
    }

    /// A block was accepted at `current_height`.
    pub fn on_block_accepted(&mut self, current_height: u64) -> SyncDecision {
        self.decide(current_height)
    }

    /// The outstanding round-results query resolved successfully.
    pub fn on_round_results(&mut self, round: u64) -> bool {
        if self.pending_request == Some(round) {
            self.pending_request = None;
            self.stop_sent = false;
            true
        } else {
            false
        }
    }

    /// The outstanding round-results query timed out. State is otherwise
    /// unchanged; a later observation re-issues the request.
    pub fn on_request_timeout(&mut self, round: u64) -> bool {
        if self.pending_request == Some(round) {
            debug!(round, "round results request timeout");
            self.pending_request = None;
            true
        } else {
            false
        }
    }

    /// Consensus resumed (a round update went out).
    pub fn on_consensus_resumed(&mut self) {
        self.stop_sent = false;
    }

    fn decide(&mut self, current_height: u64) -> SyncDecision {
        let counter = self.counter(current_height);
        if counter > 1 {
            if !self.stop_sent {
                self.stop_sent = true;
                debug!(
                    behind = counter,
                    highest = self.highest_seen,
                    "behind peers, pausing consensus"
                );
                return SyncDecision::StopConsensus;
            }
            return SyncDecision::None;
        }
        if counter == 1 && self.stop_sent && self.pending_request.is_none() {
            let round = current_height + 1;
            self.pending_request = Some(round);
            return SyncDecision::RequestRoundResults { round };
        }
        SyncDecision::None
    }
}
