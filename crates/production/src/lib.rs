//! Production runner for an SBA validator.
//!
//! Wires the deterministic node state machine to the real world: a tokio
//! event loop, task-per-timer timing, framed-TCP peers speaking the wire
//! protocol, RocksDB persistence, and Prometheus metrics.

mod config;
mod inbound;
pub mod metrics;
mod peer;
mod runner;
mod storage;
mod timers;

pub use config::{NetworkConfig, NodeConfig};
pub use inbound::{InboundQueues, DEFAULT_INBOUND_CAPACITY};
pub use peer::{handshake, Peer, PeerError};
pub use runner::{Mempool, NoopMempool, ProductionRunner, RunnerError, ShutdownHandle};
pub use storage::RocksDbStorage;
pub use timers::TimerManager;
