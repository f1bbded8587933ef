//! The round orchestrator.
//!
//! Sequences Selection → 1st Reduction → 2nd Reduction → Agreement wait,
//! advancing the step on every halt. Each phase halts on quorum or on its
//! timeout; a timed-out phase contributes an empty result and the pipeline
//! moves on. When an agreement wait expires the orchestrator starts the
//! next iteration at the following step multiple with a halved selection
//! threshold, until the round's step budget runs out.
//!
//! The orchestrator owns all per-round state and is driven exclusively by
//! events, so it holds no locks and performs no I/O.

use crate::generator::generate_candidate;
use crate::reduction::own_vote;
use crate::score::{verify_score, ScoreVerifier};
use crate::{
    Aggregator, AggregatorOutcome, AgreementCollector, ConsensusConfig, ConsensusError, Threshold,
};
use sba_core::{Action, Event, OutboundMessage, TimerId};
use sba_types::consts::STEPS_PER_ITERATION;
use sba_types::{
    create_voting_committee, Agreement, ConsensusHeader, Hash, NodeKeys, Reduction, RoundUpdate,
    ScoreEvent, ScoreProof, StepVotes, Transaction,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The phase the orchestrator is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No round in progress (before the first round update, after a stop
    /// signal, after certification, or stalled at the step budget).
    Idle,
    Selection,
    FirstReduction,
    SecondReduction,
    /// Both reductions concluded; waiting for the agreement collector.
    AgreementWait,
}

/// The SBA round state machine.
pub struct ConsensusState {
    keys: NodeKeys,
    config: ConsensusConfig,
    verifier: Arc<dyn ScoreVerifier>,

    ru: Option<RoundUpdate>,
    running: bool,
    phase: Phase,
    step: u8,
    /// First step of the current iteration.
    iteration_base: u8,
    /// Phase timeout for this round (base doubled per failed round).
    timeout: Duration,
    consecutive_failures: u32,
    round_failed: bool,
    certified: bool,

    threshold: Threshold,
    best_score: Option<ScoreEvent>,
    /// Cached prover output, reused across iterations of the round.
    score_proof: Option<ScoreProof>,

    aggregator: Option<Aggregator>,
    first_votes: Option<StepVotes>,
    agreement: Option<AgreementCollector>,
}

impl std::fmt::Debug for ConsensusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusState")
            .field("round", &self.round())
            .field("phase", &self.phase)
            .field("step", &self.step)
            .field("running", &self.running)
            .field("failures", &self.consecutive_failures)
            .finish()
    }
}

impl ConsensusState {
    pub fn new(keys: NodeKeys, config: ConsensusConfig, verifier: Arc<dyn ScoreVerifier>) -> Self {
        let threshold = Threshold::new(config.initial_threshold);
        Self {
            keys,
            config,
            verifier,
            ru: None,
            running: false,
            phase: Phase::Idle,
            step: 0,
            iteration_base: 0,
            timeout: Duration::ZERO,
            consecutive_failures: 0,
            round_failed: false,
            certified: false,
            threshold,
            best_score: None,
            score_proof: None,
            aggregator: None,
            first_votes: None,
            agreement: None,
        }
    }

    pub fn keys(&self) -> &NodeKeys {
        &self.keys
    }

    pub fn round(&self) -> u64 {
        self.ru.as_ref().map(|ru| ru.round).unwrap_or(0)
    }

    pub fn step(&self) -> u8 {
        self.step
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn round_failed(&self) -> bool {
        self.round_failed
    }

    /// The timeout phases run with in the current round.
    pub fn current_timeout(&self) -> Duration {
        self.timeout
    }

    fn ru(&self) -> &RoundUpdate {
        self.ru.as_ref().expect("round update present while running")
    }

    fn phase_timer(&self) -> TimerId {
        TimerId::Phase {
            round: self.round(),
            step: self.step,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Round lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Enter a new round.
    pub fn round_update(&mut self, update: RoundUpdate) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.running {
            actions.push(Action::CancelTimer {
                id: self.phase_timer(),
            });
        }

        self.timeout = self.config.timeout_for(self.consecutive_failures);
        info!(
            round = update.round,
            provisioners = update.provisioners.len(),
            bids = update.bid_list.len(),
            timeout_ms = self.timeout.as_millis() as u64,
            "starting round"
        );

        self.agreement = Some(AgreementCollector::new(
            update.round,
            update.seed,
            update.provisioners.clone(),
            self.config.committee_size,
            self.config.agreement_quorum,
            self.config.reduction_quorum,
        ));

        self.running = true;
        self.certified = false;
        self.round_failed = false;
        self.step = 0;
        self.iteration_base = 0;
        self.phase = Phase::Selection;
        self.threshold.reset();
        self.best_score = None;
        self.score_proof = None;
        self.first_votes = None;
        self.aggregator = None;

        actions.push(Action::SetTimer {
            id: TimerId::Phase {
                round: update.round,
                step: 0,
            },
            duration: self.timeout,
        });
        actions.push(Action::GenerateScoreProof {
            round: update.round,
            seed: update.seed,
            bid_list: update.bid_list.clone(),
        });

        self.ru = Some(update);
        actions
    }

    /// Abort the current round. Aggregators are dropped and timers
    /// cancelled; the orchestrator reinitialises on the next round update.
    pub fn stop(&mut self) -> Vec<Action> {
        if !self.running {
            return Vec::new();
        }
        info!(round = self.round(), step = self.step, "consensus stopped");
        let timer = self.phase_timer();
        self.running = false;
        self.phase = Phase::Idle;
        self.aggregator = None;
        self.agreement = None;
        self.best_score = None;
        self.first_votes = None;
        vec![Action::CancelTimer { id: timer }]
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Score generation and selection
    // ═══════════════════════════════════════════════════════════════════════

    /// Prover callback.
    pub fn score_proof_generated(
        &mut self,
        round: u64,
        proof: Option<ScoreProof>,
    ) -> Vec<Action> {
        if !self.running || round != self.round() {
            return Vec::new();
        }
        self.score_proof = proof;
        self.maybe_propose()
    }

    /// Issue a mempool fetch when the cached proof clears the threshold.
    fn maybe_propose(&mut self) -> Vec<Action> {
        if self.phase != Phase::Selection {
            return Vec::new();
        }
        let Some(proof) = &self.score_proof else {
            return Vec::new();
        };
        if !self.threshold.exceeds(&proof.score) {
            debug!(
                round = self.round(),
                step = self.step,
                "own score below threshold, not proposing"
            );
            return Vec::new();
        }
        vec![Action::FetchMempoolTxs {
            round: self.round(),
            step: self.step,
            max_size: self.config.max_tx_set_size,
        }]
    }

    /// Mempool callback: assemble and publish the candidate plus its score.
    pub fn mempool_txs_fetched(
        &mut self,
        round: u64,
        step: u8,
        txs: Vec<Transaction>,
        now: Duration,
    ) -> Vec<Action> {
        if !self.running
            || round != self.round()
            || step != self.step
            || self.phase != Phase::Selection
        {
            // A fetch from a previous iteration resolving late.
            return Vec::new();
        }
        let Some(proof) = self.score_proof.clone() else {
            return Vec::new();
        };

        let candidate = generate_candidate(
            &self.keys,
            self.ru(),
            txs,
            now.as_secs() as i64,
            self.config.max_tx_set_size,
        );
        let score = ScoreEvent {
            header: ConsensusHeader {
                pub_key_bls: self.keys.bls.public_key(),
                round,
                step,
                block_hash: candidate.hash(),
            },
            score: proof.score,
            proof: proof.proof,
            z: proof.z,
            bid_list_subset: proof.bid_list_subset,
            seed: self.ru().seed,
            prev_hash: self.ru().prev_hash,
        };

        info!(
            round,
            step,
            candidate = %candidate.hash(),
            "publishing candidate and score"
        );

        vec![
            Action::Broadcast {
                message: OutboundMessage::Score(score.clone()),
            },
            Action::Broadcast {
                message: OutboundMessage::Candidate(candidate.clone()),
            },
            Action::EnqueueInternal {
                event: Event::ScoreReceived { score },
            },
            Action::EnqueueInternal {
                event: Event::CandidateReceived { block: candidate },
            },
        ]
    }

    /// A score arrived (own or from the network).
    pub fn score_received(&mut self, score: ScoreEvent) -> Vec<Action> {
        if !self.running || self.phase != Phase::Selection {
            return Vec::new();
        }
        if score.header.round != self.round() {
            return Vec::new();
        }

        let ru = self.ru.as_ref().expect("running");
        if let Err(e) = verify_score(&score, ru, &self.threshold, self.verifier.as_ref()) {
            debug!(round = self.round(), error = %e, "dropping score");
            return Vec::new();
        }

        let better = self
            .best_score
            .as_ref()
            .map_or(true, |best| score.outranks(best));
        if better {
            debug!(
                round = self.round(),
                candidate = %score.header.block_hash,
                "new best score"
            );
            self.best_score = Some(score);
        }
        Vec::new()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Phase transitions
    // ═══════════════════════════════════════════════════════════════════════

    /// A phase timer fired.
    pub fn phase_timeout(&mut self, round: u64, step: u8) -> Vec<Action> {
        if !self.running || round != self.round() || step != self.step {
            // Stale timer from a previous phase.
            return Vec::new();
        }

        match self.phase {
            Phase::Idle => Vec::new(),
            Phase::Selection => self.conclude_selection(),
            Phase::FirstReduction => {
                debug!(round, step, "first reduction timed out");
                let votes = StepVotes::empty(self.step);
                self.enter_second_reduction(votes, Hash::ZERO)
            }
            Phase::SecondReduction => {
                debug!(round, step, "second reduction timed out");
                let votes = StepVotes::empty(self.step);
                self.conclude_iteration(votes, Hash::ZERO)
            }
            Phase::AgreementWait => self.iteration_failed(),
        }
    }

    /// Selection always runs to its timeout; the best verified score (or
    /// the empty hash) becomes the reduction target.
    fn conclude_selection(&mut self) -> Vec<Action> {
        let target = match self.best_score.take() {
            Some(best) => best.header.block_hash,
            None => {
                // No winning block before the selection timeout: halve the
                // threshold so a quieter score can win the next iteration.
                self.threshold.lower();
                Hash::ZERO
            }
        };
        debug!(
            round = self.round(),
            step = self.step,
            target = %target,
            "selection concluded"
        );
        self.enter_first_reduction(target)
    }

    fn advance_step(&mut self) -> bool {
        if self.step >= self.config.max_step {
            return false;
        }
        self.step += 1;
        true
    }

    fn stall(&mut self) -> Vec<Action> {
        warn!(
            round = self.round(),
            step = self.step,
            "step budget exhausted, round stalled until next round update"
        );
        self.phase = Phase::Idle;
        self.aggregator = None;
        Vec::new()
    }

    fn enter_first_reduction(&mut self, target: Hash) -> Vec<Action> {
        if !self.advance_step() {
            return self.stall();
        }
        self.phase = Phase::FirstReduction;
        self.first_votes = None;
        self.start_reduction_step(target)
    }

    fn enter_second_reduction(&mut self, first: StepVotes, target: Hash) -> Vec<Action> {
        // A quorum on the empty hash carries no usable aggregate.
        let first = if target.is_zero() {
            StepVotes::empty(first.step)
        } else {
            first
        };
        self.first_votes = Some(first);
        if !self.advance_step() {
            return self.stall();
        }
        self.phase = Phase::SecondReduction;
        self.start_reduction_step(target)
    }

    /// Arm the aggregator and timer for the step, and cast our own vote if
    /// we sit in the committee and have a non-empty target.
    fn start_reduction_step(&mut self, target: Hash) -> Vec<Action> {
        let ru = self.ru.as_ref().expect("running");
        let committee = create_voting_committee(
            &ru.provisioners,
            &ru.seed,
            ru.round,
            self.step,
            self.config.committee_size,
        );
        if committee.is_empty() {
            warn!(round = ru.round, step = self.step, "empty committee, round stalls");
            return self.stall();
        }

        let am_member = committee.is_member(&self.keys.bls.public_key());
        self.aggregator = Some(Aggregator::new(
            ru.round,
            self.step,
            committee,
            self.config.reduction_quorum,
        ));

        let mut actions = vec![Action::SetTimer {
            id: self.phase_timer(),
            duration: self.timeout,
        }];

        if am_member && !target.is_zero() {
            let vote = own_vote(self, target);
            actions.push(Action::Broadcast {
                message: OutboundMessage::Reduction(vote),
            });
            actions.push(Action::EnqueueInternal {
                event: Event::ReductionReceived { reduction: vote },
            });
        }
        actions
    }

    /// A reduction vote arrived for the current step.
    pub fn reduction_received(&mut self, reduction: Reduction) -> Vec<Action> {
        if !self.running {
            return Vec::new();
        }
        if !matches!(self.phase, Phase::FirstReduction | Phase::SecondReduction) {
            return Vec::new();
        }
        let Some(aggregator) = self.aggregator.as_mut() else {
            return Vec::new();
        };

        match aggregator.collect(&reduction) {
            Ok(AggregatorOutcome::Pending) => Vec::new(),
            Ok(AggregatorOutcome::Quorum { hash, votes }) => {
                let mut actions = vec![Action::CancelTimer {
                    id: self.phase_timer(),
                }];
                self.aggregator = None;
                let followup = match self.phase {
                    Phase::FirstReduction => self.enter_second_reduction(votes, hash),
                    Phase::SecondReduction => self.conclude_iteration(votes, hash),
                    _ => unreachable!("aggregator only exists during reductions"),
                };
                actions.extend(followup);
                actions
            }
            Err(e) => {
                debug!(
                    round = self.round(),
                    step = self.step,
                    error = %e,
                    "dropping reduction"
                );
                Vec::new()
            }
        }
    }

    /// Both reduction steps concluded; publish an agreement when the
    /// iteration produced a real result, then wait for the collector.
    fn conclude_iteration(&mut self, second: StepVotes, hash: Hash) -> Vec<Action> {
        let second = if hash.is_zero() {
            StepVotes::empty(second.step)
        } else {
            second
        };
        let first = self.first_votes.take().unwrap_or(StepVotes::empty(
            second.step.wrapping_sub(1),
        ));

        let mut actions = Vec::new();

        let complete = !hash.is_zero() && !first.is_empty() && !second.is_empty();
        if complete {
            let am_member = self
                .agreement
                .as_mut()
                .map(|collector| collector.is_member(&self.keys.bls.public_key(), second.step))
                .unwrap_or(false);
            if am_member {
                let agreement = Agreement {
                    header: ConsensusHeader {
                        pub_key_bls: self.keys.bls.public_key(),
                        round: self.round(),
                        step: second.step,
                        block_hash: hash,
                    },
                    votes_per_step: [first, second],
                };
                info!(
                    round = self.round(),
                    step = second.step,
                    hash = %hash,
                    "publishing agreement"
                );
                actions.push(Action::Broadcast {
                    message: OutboundMessage::Agreement(agreement.clone()),
                });
                actions.push(Action::EnqueueInternal {
                    event: Event::AgreementReceived { agreement },
                });
            }
        } else {
            debug!(
                round = self.round(),
                step = self.step,
                "iteration produced no agreement"
            );
        }

        if !self.advance_step() {
            actions.extend(self.stall());
            return actions;
        }
        self.phase = Phase::AgreementWait;
        actions.push(Action::SetTimer {
            id: self.phase_timer(),
            duration: self.timeout,
        });
        actions
    }

    /// The agreement wait expired: mark the round failed (once) and start
    /// the next iteration.
    fn iteration_failed(&mut self) -> Vec<Action> {
        if !self.round_failed {
            self.round_failed = true;
            self.consecutive_failures += 1;
            warn!(
                round = self.round(),
                failures = self.consecutive_failures,
                "round failed"
            );
        }

        let next_base = self.iteration_base.saturating_add(STEPS_PER_ITERATION);
        if next_base.saturating_add(STEPS_PER_ITERATION - 1) > self.config.max_step {
            return self.stall();
        }
        self.iteration_base = next_base;
        self.step = next_base;
        self.phase = Phase::Selection;
        self.best_score = None;
        self.first_votes = None;
        self.aggregator = None;
        self.threshold.lower();

        debug!(
            round = self.round(),
            step = self.step,
            "starting new iteration"
        );

        let mut actions = vec![Action::SetTimer {
            id: self.phase_timer(),
            duration: self.timeout,
        }];
        actions.extend(self.maybe_propose());
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Agreement
    // ═══════════════════════════════════════════════════════════════════════

    /// An agreement message arrived. Collected round-wide, independent of
    /// the current phase.
    pub fn agreement_received(&mut self, agreement: Agreement) -> Vec<Action> {
        if !self.running || self.certified {
            return Vec::new();
        }
        let Some(collector) = self.agreement.as_mut() else {
            return Vec::new();
        };

        match collector.collect(&agreement) {
            Ok(Some((hash, certificate))) => {
                info!(round = self.round(), hash = %hash, "round certified");
                self.certified = true;
                self.consecutive_failures = 0;
                let timer = self.phase_timer();
                self.phase = Phase::Idle;
                self.aggregator = None;
                vec![
                    Action::CancelTimer { id: timer },
                    Action::EnqueueInternal {
                        event: Event::CertificateFormed { hash, certificate },
                    },
                ]
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                debug!(round = self.round(), error = %e, "dropping agreement");
                Vec::new()
            }
        }
    }
}
