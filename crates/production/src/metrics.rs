//! Production metrics using the native Prometheus client.
//!
//! Metrics are domain-specific rather than generic event counters; traces
//! carry the event-level detail.

use prometheus::{register_counter, register_gauge, Counter, Gauge};
use std::sync::OnceLock;

static METRICS: OnceLock<Metrics> = OnceLock::new();

pub struct Metrics {
    // === Chain ===
    pub blocks_accepted: Counter,
    pub block_height: Gauge,

    // === Consensus ===
    pub round: Gauge,
    pub rounds_failed: Counter,
    pub certificates_formed: Counter,

    // === Network ===
    pub messages_received: Counter,
    pub messages_sent: Counter,
    pub invalid_messages: Counter,
    pub peers_connected: Gauge,

    // === Queues ===
    pub inbound_dropped: Counter,

    // === Sync ===
    pub sync_blocks_behind: Gauge,
    pub round_results_requests: Counter,
}

impl Metrics {
    fn new() -> Self {
        Self {
            blocks_accepted: register_counter!(
                "sba_blocks_accepted_total",
                "Total number of blocks accepted"
            )
            .unwrap(),
            block_height: register_gauge!("sba_block_height", "Accepted chain tip height").unwrap(),
            round: register_gauge!("sba_consensus_round", "Current consensus round").unwrap(),
            rounds_failed: register_counter!(
                "sba_rounds_failed_total",
                "Rounds that exhausted an iteration without a certificate"
            )
            .unwrap(),
            certificates_formed: register_counter!(
                "sba_certificates_formed_total",
                "Certificates produced by the agreement collector"
            )
            .unwrap(),
            messages_received: register_counter!(
                "sba_network_messages_received_total",
                "Wire messages received"
            )
            .unwrap(),
            messages_sent: register_counter!(
                "sba_network_messages_sent_total",
                "Wire messages sent"
            )
            .unwrap(),
            invalid_messages: register_counter!(
                "sba_invalid_messages_total",
                "Messages dropped during decoding or envelope verification"
            )
            .unwrap(),
            peers_connected: register_gauge!("sba_peers_connected", "Connected peers").unwrap(),
            inbound_dropped: register_counter!(
                "sba_inbound_dropped_total",
                "Inbound messages dropped by queue backpressure"
            )
            .unwrap(),
            sync_blocks_behind: register_gauge!(
                "sba_sync_blocks_behind",
                "Blocks between the local tip and the highest announced height"
            )
            .unwrap(),
            round_results_requests: register_counter!(
                "sba_round_results_requests_total",
                "Round-results fallback queries issued"
            )
            .unwrap(),
        }
    }
}

/// Global metrics handle.
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
