//! Production runner implementation.
//!
//! One tokio task drives the node state machine; timers, peers and the
//! prover run as separate tasks feeding events back through channels. No
//! lock is held across a suspension point: the state machine is owned by
//! the loop and everything else communicates by message.

use crate::inbound::InboundQueues;
use crate::metrics::metrics;
use crate::peer::{handshake, Peer};
use crate::timers::TimerManager;
use crate::NetworkConfig;
use sba_consensus::{ScoreProver, ScoreRequest};
use sba_core::{Action, Event, OutboundMessage, StateMachine, TimerId};
use sba_chain::BlockStore;
use sba_messages::{
    decode_payload, encode_frame, encode_payload, Frame, GetData, Inv, Payload, RoundResults,
};
use sba_node::NodeStateMachine;
use sba_types::consts::MAX_INV_BLOCKS;
use sba_types::{EdKeyPair, Transaction};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Errors from the production runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Event channel closed")]
    ChannelClosed,
    #[error("Listener error: {0}")]
    Listener(#[from] std::io::Error),
}

/// The mempool collaborator: returns verified transactions up to a
/// serialized size budget.
pub trait Mempool: Send + Sync {
    fn fetch(&self, max_size: usize) -> Vec<Transaction>;
}

/// A mempool that never has transactions. Blocks still carry a coinbase.
pub struct NoopMempool;

impl Mempool for NoopMempool {
    fn fetch(&self, _max_size: usize) -> Vec<Transaction> {
        Vec::new()
    }
}

/// Handle for shutting down a running [`ProductionRunner`].
///
/// When dropped, signals the runner to exit gracefully.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl ShutdownHandle {
    pub fn shutdown(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// The production event loop.
pub struct ProductionRunner {
    node: NodeStateMachine,
    envelope_keys: EdKeyPair,
    store: Arc<dyn BlockStore>,
    prover: Arc<dyn ScoreProver>,
    mempool: Arc<dyn Mempool>,
    network: NetworkConfig,

    timers: TimerManager,
    inbound: InboundQueues,
    internal: std::collections::VecDeque<Event>,

    event_tx: mpsc::Sender<Event>,
    event_rx: mpsc::Receiver<Event>,
    frame_tx: mpsc::Sender<(SocketAddr, Frame)>,
    frame_rx: mpsc::Receiver<(SocketAddr, Frame)>,
    peer_tx: mpsc::Sender<Peer>,
    peer_rx: mpsc::Receiver<Peer>,
    peers: HashMap<SocketAddr, Peer>,
    next_request_peer: usize,

    shutdown_rx: oneshot::Receiver<()>,
    /// Accepted blocks fan-out for external observers.
    accepted_tx: Option<mpsc::Sender<sba_types::Block>>,
}

impl ProductionRunner {
    pub fn new(
        node: NodeStateMachine,
        envelope_keys: EdKeyPair,
        store: Arc<dyn BlockStore>,
        prover: Arc<dyn ScoreProver>,
        mempool: Arc<dyn Mempool>,
        network: NetworkConfig,
    ) -> (Self, ShutdownHandle, mpsc::Sender<Event>) {
        let (event_tx, event_rx) = mpsc::channel(10_000);
        let (frame_tx, frame_rx) = mpsc::channel(10_000);
        let (peer_tx, peer_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let inbound = InboundQueues::new(network.inbound_capacity);
        let runner = Self {
            node,
            envelope_keys,
            store,
            prover,
            mempool,
            network,
            timers: TimerManager::new(event_tx.clone()),
            inbound,
            internal: std::collections::VecDeque::new(),
            event_tx: event_tx.clone(),
            event_rx,
            frame_tx,
            frame_rx,
            peer_tx,
            peer_rx,
            peers: HashMap::new(),
            next_request_peer: 0,
            shutdown_rx,
            accepted_tx: None,
        };
        (
            runner,
            ShutdownHandle {
                tx: Some(shutdown_tx),
            },
            event_tx,
        )
    }

    /// Subscribe to accepted blocks.
    pub fn set_accepted_sink(&mut self, sink: mpsc::Sender<sba_types::Block>) {
        self.accepted_tx = Some(sink);
    }

    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    }

    /// Accept inbound connections and dial the configured peers.
    pub fn start_network(&self, our_height: u64) -> tokio::task::JoinHandle<()> {
        let listen = self.network.listen_addr.clone();
        let dial = self.network.peers.clone();
        let magic = self.network.magic;
        let frame_tx = self.frame_tx.clone();
        let peer_tx = self.peer_tx.clone();

        tokio::spawn(async move {
            for addr in dial {
                let frame_tx = frame_tx.clone();
                let peer_tx = peer_tx.clone();
                tokio::spawn(async move {
                    match TcpStream::connect(&addr).await {
                        Ok(stream) => {
                            match handshake(stream, magic, our_height, frame_tx).await {
                                Ok(peer) => {
                                    let _ = peer_tx.send(peer).await;
                                }
                                Err(e) => warn!(%addr, error = %e, "outbound handshake failed"),
                            }
                        }
                        Err(e) => warn!(%addr, error = %e, "dial failed"),
                    }
                });
            }

            let listener = match TcpListener::bind(&listen).await {
                Ok(l) => l,
                Err(e) => {
                    warn!(%listen, error = %e, "cannot bind listener");
                    return;
                }
            };
            info!(%listen, "listening for peers");
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let frame_tx = frame_tx.clone();
                        let peer_tx = peer_tx.clone();
                        tokio::spawn(async move {
                            match handshake(stream, magic, our_height, frame_tx).await {
                                Ok(peer) => {
                                    let _ = peer_tx.send(peer).await;
                                }
                                Err(e) => debug!(%addr, error = %e, "inbound handshake failed"),
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        return;
                    }
                }
            }
        })
    }

    /// Run until shutdown. Processes internal events before queued network
    /// input, preserving causality within a turn.
    pub async fn run(mut self, bootstrap_actions: Vec<Action>) -> Result<(), RunnerError> {
        self.apply_actions(bootstrap_actions);

        loop {
            if let Some(event) = self.internal.pop_front() {
                self.process(event);
                continue;
            }
            if let Some(event) = self.inbound.pop() {
                self.process(event);
                continue;
            }

            tokio::select! {
                _ = &mut self.shutdown_rx => {
                    info!("shutdown requested");
                    self.timers.cancel_all();
                    return Ok(());
                }
                maybe_event = self.event_rx.recv() => {
                    let event = maybe_event.ok_or(RunnerError::ChannelClosed)?;
                    self.inbound.push(event);
                }
                maybe_frame = self.frame_rx.recv() => {
                    if let Some((addr, frame)) = maybe_frame {
                        self.handle_frame(addr, frame);
                    }
                }
                maybe_peer = self.peer_rx.recv() => {
                    if let Some(peer) = maybe_peer {
                        let height = peer.height;
                        info!(addr = %peer.addr, height, "peer connected");
                        self.peers.insert(peer.addr, peer);
                        self.inbound.push(Event::PeerHeight { height });
                    }
                }
            }
        }
    }

    fn process(&mut self, event: Event) {
        let now = self.now();
        let actions = self.node.handle(event, now);
        self.apply_actions(actions);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Actions
    // ═══════════════════════════════════════════════════════════════════════

    fn broadcast_frame(&mut self, bytes: Vec<u8>) {
        for peer in self.peers.values() {
            peer.send(bytes.clone());
        }
    }

    fn encode_outbound(&self, message: &OutboundMessage) -> Vec<u8> {
        let payload = match message {
            OutboundMessage::Score(score) => Payload::Score(score.clone()),
            OutboundMessage::Candidate(block) => Payload::Candidate(block.clone()),
            OutboundMessage::Reduction(reduction) => Payload::Reduction(*reduction),
            OutboundMessage::Agreement(agreement) => Payload::Agreement(agreement.clone()),
            OutboundMessage::Block(block) => Payload::Block(block.clone()),
            OutboundMessage::Inv { block_hash, .. } => Payload::Inv(Inv::block(*block_hash)),
            OutboundMessage::GetRoundResults { round } => {
                Payload::GetRoundResults { round: *round }
            }
        };
        let topic = payload.topic();
        let body = encode_payload(&payload, &self.envelope_keys);
        encode_frame(topic, &body)
    }

    fn apply_actions(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Broadcast { message } => {
                    let bytes = self.encode_outbound(&message);
                    self.broadcast_frame(bytes);
                }
                Action::SetTimer { id, duration } => self.timers.set_timer(id, duration),
                Action::CancelTimer { id } => self.timers.cancel_timer(id),
                Action::EnqueueInternal { event } => self.internal.push_back(event),
                Action::GenerateScoreProof {
                    round,
                    seed,
                    bid_list,
                } => {
                    let prover = Arc::clone(&self.prover);
                    let event_tx = self.event_tx.clone();
                    tokio::task::spawn_blocking(move || {
                        let proof = prover.prove(&ScoreRequest {
                            round,
                            seed,
                            bid_list,
                        });
                        let _ = event_tx.blocking_send(Event::ScoreProofGenerated { round, proof });
                    });
                }
                Action::FetchMempoolTxs {
                    round,
                    step,
                    max_size,
                } => {
                    let txs = self.mempool.fetch(max_size);
                    self.internal
                        .push_back(Event::MempoolTxsFetched { round, step, txs });
                }
                Action::RequestRoundResults { round, timeout } => {
                    metrics().round_results_requests.inc();
                    self.send_to_one_peer(Payload::GetRoundResults { round });
                    self.timers.set_timer(TimerId::RoundResults { round }, timeout);
                }
                Action::EmitAcceptedBlock { block } => {
                    metrics().blocks_accepted.inc();
                    metrics().block_height.set(block.height() as f64);
                    if let Some(sink) = &self.accepted_tx {
                        let _ = sink.try_send(block);
                    }
                }
                Action::ClearDatabase => {
                    // The chain wiped its store directly during rebuild.
                    debug!("database cleared");
                }
            }
        }
    }

    fn send_to_one_peer(&mut self, payload: Payload) {
        if self.peers.is_empty() {
            warn!("no peers available for request");
            return;
        }
        let addrs: Vec<SocketAddr> = self.peers.keys().copied().collect();
        let addr = addrs[self.next_request_peer % addrs.len()];
        self.next_request_peer = self.next_request_peer.wrapping_add(1);
        let topic = payload.topic();
        let body = encode_payload(&payload, &self.envelope_keys);
        if let Some(peer) = self.peers.get(&addr) {
            peer.send(encode_frame(topic, &body));
        }
    }

    fn send_to_peer(&self, addr: SocketAddr, payload: Payload) {
        let topic = payload.topic();
        let body = encode_payload(&payload, &self.envelope_keys);
        if let Some(peer) = self.peers.get(&addr) {
            peer.send(encode_frame(topic, &body));
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Inbound frames
    // ═══════════════════════════════════════════════════════════════════════

    /// Decode a frame and either queue the resulting event or serve the
    /// request from the store.
    fn handle_frame(&mut self, addr: SocketAddr, frame: Frame) {
        let payload = match decode_payload(frame.topic, &frame.payload) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(addr = %addr, topic = %frame.topic, error = %e, "dropping frame");
                metrics().invalid_messages.inc();
                return;
            }
        };

        match payload {
            Payload::Version(v) => {
                self.inbound.push(Event::PeerHeight { height: v.height });
            }
            Payload::VerAck(_) => {}
            Payload::Score(score) => {
                self.inbound.push(Event::ScoreReceived { score });
            }
            Payload::Candidate(block) => {
                self.inbound.push(Event::CandidateReceived { block });
            }
            Payload::Reduction(reduction) => {
                self.inbound.push(Event::ReductionReceived { reduction });
            }
            Payload::Agreement(agreement) => {
                self.inbound.push(Event::AgreementReceived { agreement });
            }
            Payload::Block(block) => {
                self.inbound.push(Event::BlockReceived { block });
            }
            Payload::RoundResults(results) => {
                self.inbound.push(Event::RoundResultsReceived {
                    round: results.round,
                    block: results.block,
                });
            }
            Payload::Inv(inv) => {
                // Ask for whatever we do not have.
                let missing: Vec<_> = inv
                    .items
                    .into_iter()
                    .filter(|item| {
                        matches!(
                            self.store.block_by_hash(&item.hash),
                            Ok(None)
                        )
                    })
                    .collect();
                if !missing.is_empty() {
                    self.send_to_peer(addr, Payload::GetData(GetData { items: missing }));
                }
            }
            Payload::GetData(request) => {
                for item in request.items {
                    if let Ok(Some(block)) = self.store.block_by_hash(&item.hash) {
                        self.send_to_peer(addr, Payload::Block(block));
                    }
                }
            }
            Payload::GetBlocks(request) => self.serve_blocks(addr, request.from_height),
            Payload::GetHeaders(request) => self.serve_blocks(addr, request.from_height),
            Payload::GetRoundResults { round } => {
                if let Ok(Some(block)) = self.store.block_by_height(round) {
                    self.send_to_peer(addr, Payload::RoundResults(RoundResults { round, block }));
                } else {
                    debug!(addr = %addr, round, "round results not available");
                }
            }
        }
    }

    /// Stream stored blocks above `from_height`, bounded per session.
    fn serve_blocks(&self, addr: SocketAddr, from_height: u64) {
        for height in (from_height + 1)..=(from_height + MAX_INV_BLOCKS as u64) {
            match self.store.block_by_height(height) {
                Ok(Some(block)) => self.send_to_peer(addr, Payload::Block(block)),
                _ => break,
            }
        }
    }
}
