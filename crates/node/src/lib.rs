//! The node state machine.
//!
//! Composes the round orchestrator and the chain acceptor into one
//! deterministic state machine, and enforces the inbound dispatch rules:
//!
//! - messages for past rounds (or past steps of the current round) are
//!   dropped
//! - messages for future `(round, step)` slots are parked in a bounded
//!   queue and drained on transition, before new network input
//! - agreement messages route by round only; the collector spans all steps
//!
//! Envelope signatures are checked at the transport layer; BLS committee
//! membership and vote signatures are checked by the aggregators before
//! any aggregation.

mod queue;

pub use queue::FutureQueue;

use sba_chain::Chain;
use sba_consensus::{ConsensusConfig, ConsensusState, ScoreVerifier};
use sba_core::{Action, Event, StateMachine};
use sba_types::NodeKeys;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on each future-queue slot.
pub const DEFAULT_QUEUE_CAPACITY: usize = 5000;

/// One validator node: orchestrator plus chain, driven by events.
pub struct NodeStateMachine {
    consensus: ConsensusState,
    chain: Chain,
    queue: FutureQueue,
}

impl NodeStateMachine {
    pub fn new(
        keys: NodeKeys,
        config: ConsensusConfig,
        verifier: Arc<dyn ScoreVerifier>,
        chain: Chain,
    ) -> Self {
        Self {
            consensus: ConsensusState::new(keys, config, verifier),
            chain,
            queue: FutureQueue::new(DEFAULT_QUEUE_CAPACITY),
        }
    }

    pub fn consensus(&self) -> &ConsensusState {
        &self.consensus
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut Chain {
        &mut self.chain
    }

    /// Route one event to the owning component. Consensus messages pass
    /// the round/step gate first.
    fn dispatch(&mut self, event: Event, now: Duration) -> Vec<Action> {
        match event {
            // Consensus messages, gated by (round, step).
            Event::ScoreReceived { .. }
            | Event::ReductionReceived { .. }
            | Event::AgreementReceived { .. } => self.dispatch_consensus_message(event),

            // Timers.
            Event::PhaseTimeout { round, step } => self.consensus.phase_timeout(round, step),
            Event::RoundResultsTimeout { round } => self.chain.round_results_timeout(round),

            // Chain-bound network input.
            Event::CandidateReceived { block } => self.chain.candidate_received(block),
            Event::BlockReceived { block } => self.chain.block_received(block),
            Event::RoundResultsReceived { round, block } => {
                self.chain.round_results_received(round, block)
            }
            Event::PeerHeight { height } => self.chain.peer_height(height),

            // Internal flow.
            Event::CertificateFormed { hash, certificate } => {
                self.chain.handle_certificate(hash, certificate)
            }
            Event::RoundUpdated { update } => self.consensus.round_update(update),
            Event::StopConsensus => self.consensus.stop(),

            // Delegated-work callbacks.
            Event::ScoreProofGenerated { round, proof } => {
                self.consensus.score_proof_generated(round, proof)
            }
            Event::MempoolTxsFetched { round, step, txs } => {
                self.consensus.mempool_txs_fetched(round, step, txs, now)
            }

            // Operator.
            Event::RebuildRequested => match self.chain.rebuild() {
                Ok(actions) => actions,
                Err(e) => {
                    warn!(error = %e, "rebuild failed");
                    Vec::new()
                }
            },
        }
    }

    /// Apply the park/drop rules, then deliver.
    fn dispatch_consensus_message(&mut self, event: Event) -> Vec<Action> {
        let current_round = self.consensus.round();
        let current_step = self.consensus.step();

        let (round, step, by_step) = match &event {
            Event::ScoreReceived { score } => (score.header.round, score.header.step, true),
            Event::ReductionReceived { reduction } => {
                (reduction.header.round, reduction.header.step, true)
            }
            // Agreements route by round only; park under step 0 so they
            // drain the moment the round starts.
            Event::AgreementReceived { agreement } => (agreement.header.round, 0, false),
            _ => unreachable!("only consensus messages reach this path"),
        };

        if round < current_round {
            debug!(round, current_round, kind = event.type_name(), "dropping stale message");
            return Vec::new();
        }
        if round > current_round || (by_step && step > current_step) {
            self.queue.push(round, step, event);
            return Vec::new();
        }
        if by_step && step < current_step {
            debug!(round, step, current_step, kind = event.type_name(), "dropping past-step message");
            return Vec::new();
        }

        match event {
            Event::ScoreReceived { score } => self.consensus.score_received(score),
            Event::ReductionReceived { reduction } => self.consensus.reduction_received(reduction),
            Event::AgreementReceived { agreement } => self.consensus.agreement_received(agreement),
            _ => unreachable!(),
        }
    }
}

impl StateMachine for NodeStateMachine {
    /// Handle one event, then drain any parked messages the resulting
    /// `(round, step)` transition unlocked, before returning control to
    /// the runner.
    fn handle(&mut self, event: Event, now: Duration) -> Vec<Action> {
        let mut actions = Vec::new();
        let mut pending = VecDeque::new();
        pending.push_back(event);

        while let Some(next) = pending.pop_front() {
            let before = (self.consensus.round(), self.consensus.step());
            actions.extend(self.dispatch(next, now));
            let after = (self.consensus.round(), self.consensus.step());
            if after != before {
                for drained in self.queue.drain_up_to(after.0, after.1) {
                    pending.push_back(drained);
                }
            }
        }
        actions
    }
}
