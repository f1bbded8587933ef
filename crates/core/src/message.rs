//! Outbound messages produced by the state machine.

use sba_types::{Agreement, Block, Hash, Reduction, ScoreEvent};

/// Messages the state machine asks the runner to gossip.
///
/// The runner owns envelope signing and wire framing; the state machine
/// deals in payloads only.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Score(ScoreEvent),
    Candidate(Block),
    Reduction(Reduction),
    Agreement(Agreement),
    /// A full accepted block, for peers that requested it.
    Block(Block),
    /// Inventory announcement of a newly accepted block.
    Inv { block_hash: Hash, height: u64 },
    /// Query for a round's decided block plus certificate.
    GetRoundResults { round: u64 },
}

impl OutboundMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::Score(_) => "Score",
            OutboundMessage::Candidate(_) => "Candidate",
            OutboundMessage::Reduction(_) => "Reduction",
            OutboundMessage::Agreement(_) => "Agreement",
            OutboundMessage::Block(_) => "Block",
            OutboundMessage::Inv { .. } => "Inv",
            OutboundMessage::GetRoundResults { .. } => "GetRoundResults",
        }
    }
}
