//! Deterministic simulation runner.
//!
//! Drives a set of node state machines against a simulated clock and
//! network. Events are processed in `(time, priority, sequence)` order;
//! delegated work (prover, mempool) runs inline. Given the same seed, a
//! run produces identical results every time.

use crate::event_queue::EventKey;
use crate::fixtures::sim_keys;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sba_chain::{Chain, MemoryStore};
use sba_consensus::{
    BidSecrets, ConsensusConfig, HashProver, HashVerifier, ScoreProver, ScoreRequest,
};
use sba_core::{Action, Event, OutboundMessage, StateMachine, TimerId};
use sba_node::NodeStateMachine;
use sba_types::{Bid, BidList, Block, NodeKeys, Provisioners, Stake, Transaction};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Number of validator nodes.
    pub nodes: usize,
    /// Equal stake per provisioner.
    pub stake: u64,
    /// Stake expiry height.
    pub stake_end_height: u64,
    /// The first `bidders` nodes hold blind bids.
    pub bidders: usize,
    /// Bid expiry height.
    pub bid_end_height: u64,
    /// One-way network latency.
    pub latency: Duration,
    /// Extra jitter bound (uniform, per delivery).
    pub jitter: Duration,
    /// RNG seed for jitter.
    pub seed: u64,
    pub consensus: ConsensusConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            nodes: 5,
            stake: 1000,
            stake_end_height: 1000,
            bidders: 3,
            bid_end_height: 1000,
            latency: Duration::from_millis(50),
            jitter: Duration::from_millis(10),
            seed: 0,
            consensus: ConsensusConfig {
                // Simulations run with an open threshold so the
                // deterministic scores always qualify.
                initial_threshold: [0u8; 32],
                ..ConsensusConfig::default()
            },
        }
    }
}

/// Statistics collected during a run.
#[derive(Debug, Default, Clone)]
pub struct SimulationStats {
    pub events_processed: u64,
    pub messages_delivered: u64,
    pub timers_set: u64,
    pub timers_cancelled: u64,
}

/// A recorded round-results request a test can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundResultsRequest {
    pub node: usize,
    pub round: u64,
}

pub struct SimulationRunner {
    nodes: Vec<NodeStateMachine>,
    keys: Vec<NodeKeys>,
    provers: Vec<Arc<dyn ScoreProver>>,
    mempools: Vec<Vec<Transaction>>,
    stores: Vec<Arc<MemoryStore>>,
    accepted: Vec<Vec<Block>>,

    queue: BTreeMap<EventKey, (usize, Event)>,
    timers: HashMap<(usize, TimerId), EventKey>,
    now: Duration,
    seq: u64,
    rng: ChaCha8Rng,
    config: SimConfig,

    round_results_requests: Vec<RoundResultsRequest>,
    stats: SimulationStats,
}

impl SimulationRunner {
    /// Build a network of nodes sharing one genesis state: equal stakes
    /// for every node, bids for the first `bidders` nodes.
    pub fn new(config: SimConfig) -> Self {
        let keys: Vec<NodeKeys> = (0..config.nodes).map(|i| sim_keys(i as u8)).collect();

        let mut provisioners = Provisioners::default();
        for k in &keys {
            provisioners.add_member(
                k.bls.public_key(),
                k.ed.public_key(),
                Stake::new(config.stake, 0, config.stake_end_height),
            );
        }

        let mut bid_list = BidList::default();
        let mut secrets: Vec<Option<BidSecrets>> = Vec::with_capacity(config.nodes);
        for i in 0..config.nodes {
            if i < config.bidders {
                let s = BidSecrets {
                    d: [i as u8 + 1; 32],
                    k: [i as u8 + 101; 32],
                    m: [i as u8 + 201; 32],
                };
                bid_list.add_bid(Bid::new(&s.d, &s.m, config.bid_end_height));
                secrets.push(Some(s));
            } else {
                secrets.push(None);
            }
        }

        let mut runner = Self {
            nodes: Vec::new(),
            keys: keys.clone(),
            provers: secrets
                .into_iter()
                .map(|s| Arc::new(HashProver::new(s)) as Arc<dyn ScoreProver>)
                .collect(),
            mempools: vec![Vec::new(); config.nodes],
            stores: Vec::new(),
            accepted: vec![Vec::new(); config.nodes],
            queue: BTreeMap::new(),
            timers: HashMap::new(),
            now: Duration::ZERO,
            seq: 0,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            round_results_requests: Vec::new(),
            stats: SimulationStats::default(),
            config,
        };

        for (i, k) in keys.into_iter().enumerate() {
            let store = Arc::new(MemoryStore::new());
            let (chain, boot_actions) =
                Chain::bootstrap(store.clone(), provisioners.clone(), bid_list.clone())
                    .expect("bootstrap on a fresh memory store");
            runner.stores.push(store);
            runner.nodes.push(NodeStateMachine::new(
                k,
                runner.config.consensus.clone(),
                Arc::new(HashVerifier),
                chain,
            ));
            runner.apply_actions(i, boot_actions);
        }
        runner
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn node(&self, index: usize) -> &NodeStateMachine {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut NodeStateMachine {
        &mut self.nodes[index]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn keys(&self, index: usize) -> &NodeKeys {
        &self.keys[index]
    }

    pub fn store(&self, index: usize) -> &MemoryStore {
        &self.stores[index]
    }

    pub fn accepted_blocks(&self, index: usize) -> &[Block] {
        &self.accepted[index]
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn round_results_requests(&self) -> &[RoundResultsRequest] {
        &self.round_results_requests
    }

    /// Seed a node's mempool for candidate generation.
    pub fn set_mempool(&mut self, node: usize, txs: Vec<Transaction>) {
        self.mempools[node] = txs;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Scheduling
    // ═══════════════════════════════════════════════════════════════════════

    fn next_key(&mut self, time: Duration, event: &Event) -> EventKey {
        let key = EventKey {
            time,
            priority: event.priority(),
            seq: self.seq,
        };
        self.seq += 1;
        key
    }

    fn schedule(&mut self, node: usize, event: Event, at: Duration) -> EventKey {
        let key = self.next_key(at, &event);
        self.queue.insert(key, (node, event));
        key
    }

    /// Inject an external event at the current time plus `delay`.
    pub fn inject(&mut self, node: usize, event: Event, delay: Duration) {
        let at = self.now + delay;
        self.schedule(node, event, at);
    }

    fn delivery_time(&mut self) -> Duration {
        let jitter_ns = self.config.jitter.as_nanos() as u64;
        let jitter = if jitter_ns == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.rng.gen_range(0..jitter_ns))
        };
        self.now + self.config.latency + jitter
    }

    fn broadcast(&mut self, from: usize, message: OutboundMessage) {
        for to in 0..self.nodes.len() {
            if to == from {
                continue;
            }
            let event = match &message {
                OutboundMessage::Score(score) => Event::ScoreReceived {
                    score: score.clone(),
                },
                OutboundMessage::Candidate(block) => Event::CandidateReceived {
                    block: block.clone(),
                },
                OutboundMessage::Reduction(reduction) => Event::ReductionReceived {
                    reduction: *reduction,
                },
                OutboundMessage::Agreement(agreement) => Event::AgreementReceived {
                    agreement: agreement.clone(),
                },
                OutboundMessage::Block(block) => Event::BlockReceived {
                    block: block.clone(),
                },
                OutboundMessage::Inv { height, .. } => Event::PeerHeight { height: *height },
                OutboundMessage::GetRoundResults { .. } => continue,
            };
            let at = self.delivery_time();
            self.schedule(to, event, at);
            self.stats.messages_delivered += 1;
        }
    }

    fn apply_actions(&mut self, node: usize, actions: Vec<Action>) {
        for action in actions {
            trace!(node, action = action.type_name(), "applying action");
            match action {
                Action::Broadcast { message } => self.broadcast(node, message),
                Action::SetTimer { id, duration } => {
                    let event = match id {
                        TimerId::Phase { round, step } => Event::PhaseTimeout { round, step },
                        TimerId::RoundResults { round } => Event::RoundResultsTimeout { round },
                    };
                    let at = self.now + duration;
                    let key = self.schedule(node, event, at);
                    if let Some(old) = self.timers.insert((node, id), key) {
                        self.queue.remove(&old);
                    }
                    self.stats.timers_set += 1;
                }
                Action::CancelTimer { id } => {
                    if let Some(key) = self.timers.remove(&(node, id)) {
                        self.queue.remove(&key);
                        self.stats.timers_cancelled += 1;
                    }
                }
                Action::EnqueueInternal { event } => {
                    let at = self.now;
                    self.schedule(node, event, at);
                }
                Action::GenerateScoreProof {
                    round,
                    seed,
                    bid_list,
                } => {
                    let proof = self.provers[node].prove(&ScoreRequest {
                        round,
                        seed,
                        bid_list,
                    });
                    let at = self.now;
                    self.schedule(node, Event::ScoreProofGenerated { round, proof }, at);
                }
                Action::FetchMempoolTxs { round, step, .. } => {
                    let txs = self.mempools[node].clone();
                    let at = self.now;
                    self.schedule(node, Event::MempoolTxsFetched { round, step, txs }, at);
                }
                Action::RequestRoundResults { round, timeout } => {
                    self.round_results_requests
                        .push(RoundResultsRequest { node, round });
                    let at = self.now + timeout;
                    self.schedule(node, Event::RoundResultsTimeout { round }, at);
                }
                Action::EmitAcceptedBlock { block } => {
                    debug!(node, height = block.height(), "block accepted");
                    self.accepted[node].push(block);
                }
                Action::ClearDatabase => {
                    // The chain clears its store directly.
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Execution
    // ═══════════════════════════════════════════════════════════════════════

    /// Process one event. Returns false when the queue is empty.
    pub fn step(&mut self) -> bool {
        let Some((&key, _)) = self.queue.iter().next() else {
            return false;
        };
        let (node, event) = self.queue.remove(&key).expect("key just observed");
        self.now = key.time;
        self.timers.retain(|_, timer_key| *timer_key != key);

        trace!(node, time = ?self.now, kind = event.type_name(), "processing event");
        self.stats.events_processed += 1;

        let actions = self.nodes[node].handle(event, self.now);
        self.apply_actions(node, actions);
        true
    }

    /// Run until the clock passes `deadline` or the queue drains.
    pub fn run_until(&mut self, deadline: Duration) {
        while let Some((&key, _)) = self.queue.iter().next() {
            if key.time > deadline {
                break;
            }
            self.step();
        }
        if self.now < deadline {
            self.now = deadline;
        }
    }

    /// Run for `duration` of simulated time.
    pub fn run_for(&mut self, duration: Duration) {
        let deadline = self.now + duration;
        self.run_until(deadline);
    }
}
