//! Action types for the deterministic state machine.

use crate::{Event, OutboundMessage, TimerId};
use sba_types::{BidList, Block, Seed};
use std::time::Duration;

/// Actions the state machine wants to perform.
///
/// Actions are **commands** - they describe something to do.
/// The runner executes actions and may convert results back into events.
#[derive(Debug, Clone)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// Gossip a message to the network. Non-blocking; a slow peer must not
    /// stall consensus.
    Broadcast { message: OutboundMessage },

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// Set a timer to fire after a duration.
    SetTimer { id: TimerId, duration: Duration },

    /// Cancel a previously set timer.
    CancelTimer { id: TimerId },

    // ═══════════════════════════════════════════════════════════════════════
    // Internal (fed back as events with Internal priority)
    // ═══════════════════════════════════════════════════════════════════════
    /// Enqueue an internal event for immediate processing.
    ///
    /// Internal events are processed at the same timestamp with higher
    /// priority than external events, preserving causality.
    EnqueueInternal { event: Event },

    // ═══════════════════════════════════════════════════════════════════════
    // Delegated Work (async, returns callback event)
    // ═══════════════════════════════════════════════════════════════════════
    /// Run the blind-bid prover for this round's seed and bid list.
    ///
    /// Returns `Event::ScoreProofGenerated` when complete.
    GenerateScoreProof {
        round: u64,
        seed: Seed,
        bid_list: BidList,
    },

    /// Ask the mempool for transactions up to `max_size` serialized bytes.
    ///
    /// Returns `Event::MempoolTxsFetched` when complete.
    FetchMempoolTxs {
        round: u64,
        step: u8,
        max_size: usize,
    },

    /// Query peers for a round's decided block plus certificate, with a
    /// response deadline. The runner delivers `Event::RoundResultsReceived`
    /// or `Event::RoundResultsTimeout`.
    RequestRoundResults { round: u64, timeout: Duration },

    // ═══════════════════════════════════════════════════════════════════════
    // External Notifications
    // ═══════════════════════════════════════════════════════════════════════
    /// Emit an accepted block for external observers (mempool, generation).
    EmitAcceptedBlock { block: Block },

    // ═══════════════════════════════════════════════════════════════════════
    // Storage (rebuild)
    // ═══════════════════════════════════════════════════════════════════════
    /// Wipe the block store. Only issued during an operator rebuild.
    ClearDatabase,
}

impl Action {
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Broadcast { .. } => "Broadcast",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::EnqueueInternal { .. } => "EnqueueInternal",
            Action::GenerateScoreProof { .. } => "GenerateScoreProof",
            Action::FetchMempoolTxs { .. } => "FetchMempoolTxs",
            Action::RequestRoundResults { .. } => "RequestRoundResults",
            Action::EmitAcceptedBlock { .. } => "EmitAcceptedBlock",
            Action::ClearDatabase => "ClearDatabase",
        }
    }
}
