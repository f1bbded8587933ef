//! Event types for the deterministic state machine.

use sba_types::{
    Agreement, Block, Certificate, Hash, Reduction, RoundUpdate, ScoreEvent, ScoreProof,
    Transaction,
};

/// Priority levels for event ordering within the same timestamp.
///
/// Events at the same simulation time are processed in priority order.
/// Lower values = higher priority (processed first).
///
/// This ensures causality is preserved: internal events (consequences of
/// processing an event) are handled before new external inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EventPriority {
    /// Internal events: consequences of prior event processing.
    Internal = 0,
    /// Timer events: scheduled by the node itself.
    Timer = 1,
    /// Network events: external inputs from other nodes.
    Network = 2,
    /// Operator events: external inputs from the node operator.
    Operator = 3,
}

/// All possible events a node can receive.
///
/// Events are **passive data** - they describe something that happened.
/// The state machine processes events and returns actions.
#[derive(Debug, Clone)]
pub enum Event {
    // ═══════════════════════════════════════════════════════════════════════
    // Timers (priority: Timer)
    // ═══════════════════════════════════════════════════════════════════════
    /// The current phase's timeout expired.
    PhaseTimeout { round: u64, step: u8 },

    /// The round-results query deadline expired without a response.
    RoundResultsTimeout { round: u64 },

    // ═══════════════════════════════════════════════════════════════════════
    // Network Messages (priority: Network)
    // ═══════════════════════════════════════════════════════════════════════
    /// Received a score from a block generator.
    ScoreReceived { score: ScoreEvent },

    /// Received a candidate block (certificate placeholder empty).
    CandidateReceived { block: Block },

    /// Received a reduction vote.
    ReductionReceived { reduction: Reduction },

    /// Received an agreement message.
    AgreementReceived { agreement: Agreement },

    /// Received a full block (sync path).
    BlockReceived { block: Block },

    /// Received a round-results response: the missing block with its
    /// certificate attached.
    RoundResultsReceived { round: u64, block: Block },

    /// A peer announced its chain height.
    PeerHeight { height: u64 },

    // ═══════════════════════════════════════════════════════════════════════
    // Internal Events (priority: Internal)
    // These replace channel sends between tasks
    // ═══════════════════════════════════════════════════════════════════════
    /// The agreement collector certified a block hash.
    CertificateFormed {
        hash: Hash,
        certificate: Certificate,
    },

    /// The chain advanced into a new round.
    RoundUpdated { update: RoundUpdate },

    /// Abort the current round: timers cancelled, aggregators dropped.
    /// The future-step queue is retained for the next round.
    StopConsensus,

    // ═══════════════════════════════════════════════════════════════════════
    // Async Callbacks (priority: Internal)
    // Results from delegated work (prover, mempool)
    // ═══════════════════════════════════════════════════════════════════════
    /// Blind-bid score proof generation completed.
    ///
    /// Callback from `Action::GenerateScoreProof`. `proof` is `None` when
    /// the node holds no bid.
    ScoreProofGenerated { round: u64, proof: Option<ScoreProof> },

    /// Mempool returned transactions for candidate assembly.
    ///
    /// Callback from `Action::FetchMempoolTxs`.
    MempoolTxsFetched {
        round: u64,
        step: u8,
        txs: Vec<Transaction>,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Operator Requests (priority: Operator)
    // ═══════════════════════════════════════════════════════════════════════
    /// Operator requested a rebuild from genesis.
    RebuildRequested,
}

impl Event {
    /// Get the priority for this event type.
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::CertificateFormed { .. }
            | Event::RoundUpdated { .. }
            | Event::StopConsensus
            | Event::ScoreProofGenerated { .. }
            | Event::MempoolTxsFetched { .. } => EventPriority::Internal,

            Event::PhaseTimeout { .. } | Event::RoundResultsTimeout { .. } => EventPriority::Timer,

            Event::ScoreReceived { .. }
            | Event::CandidateReceived { .. }
            | Event::ReductionReceived { .. }
            | Event::AgreementReceived { .. }
            | Event::BlockReceived { .. }
            | Event::RoundResultsReceived { .. }
            | Event::PeerHeight { .. } => EventPriority::Network,

            Event::RebuildRequested => EventPriority::Operator,
        }
    }

    /// Get the event type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::PhaseTimeout { .. } => "PhaseTimeout",
            Event::RoundResultsTimeout { .. } => "RoundResultsTimeout",
            Event::ScoreReceived { .. } => "ScoreReceived",
            Event::CandidateReceived { .. } => "CandidateReceived",
            Event::ReductionReceived { .. } => "ReductionReceived",
            Event::AgreementReceived { .. } => "AgreementReceived",
            Event::BlockReceived { .. } => "BlockReceived",
            Event::RoundResultsReceived { .. } => "RoundResultsReceived",
            Event::PeerHeight { .. } => "PeerHeight",
            Event::CertificateFormed { .. } => "CertificateFormed",
            Event::RoundUpdated { .. } => "RoundUpdated",
            Event::StopConsensus => "StopConsensus",
            Event::ScoreProofGenerated { .. } => "ScoreProofGenerated",
            Event::MempoolTxsFetched { .. } => "MempoolTxsFetched",
            Event::RebuildRequested => "RebuildRequested",
        }
    }
}
