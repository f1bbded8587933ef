//! SBA validator node.
//!
//! Configuration comes from the environment:
//!
//! - `SBA_DATA_DIR`: database directory (default `./sba-data`)
//! - `SBA_LISTEN`: listen address (default `0.0.0.0:7045`)
//! - `SBA_PEERS`: comma-separated peer addresses to dial
//! - `SBA_KEY_SEED`: hex-encoded 32-byte seed for the node identity

use sba_chain::{BlockStore, Chain};
use sba_consensus::{ConsensusConfig, HashProver, HashVerifier};
use sba_node::NodeStateMachine;
use sba_production::{
    NetworkConfig, NoopMempool, ProductionRunner, RocksDbStorage,
};
use sba_types::{BidList, NodeKeys, Provisioners};
use std::sync::Arc;
use tracing::info;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn key_seed() -> [u8; 32] {
    let mut seed = [0u8; 32];
    if let Ok(hex_seed) = std::env::var("SBA_KEY_SEED") {
        if let Ok(bytes) = hex::decode(hex_seed.trim()) {
            if bytes.len() == 32 {
                seed.copy_from_slice(&bytes);
                return seed;
            }
        }
        eprintln!("SBA_KEY_SEED must be 64 hex characters");
        std::process::exit(1);
    }
    seed
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let data_dir = env_or("SBA_DATA_DIR", "./sba-data");
    let network = NetworkConfig {
        listen_addr: env_or("SBA_LISTEN", "0.0.0.0:7045"),
        peers: std::env::var("SBA_PEERS")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        ..NetworkConfig::default()
    };

    let keys = NodeKeys::from_seed(&key_seed());
    let store: Arc<dyn BlockStore> = Arc::new(RocksDbStorage::open(&data_dir)?);

    // Resume from the stored chain, or bootstrap a fresh one.
    let (chain, boot_actions) = if store.tip()?.is_some() {
        info!("resuming from existing store");
        (Chain::load(Arc::clone(&store))?, Vec::new())
    } else {
        info!("bootstrapping fresh chain");
        Chain::bootstrap(
            Arc::clone(&store),
            Provisioners::default(),
            BidList::default(),
        )?
    };
    let height = chain.prev_block().height();

    let node = NodeStateMachine::new(
        keys.clone(),
        ConsensusConfig::default(),
        Arc::new(HashVerifier),
        chain,
    );

    let (runner, shutdown, _event_tx) = ProductionRunner::new(
        node,
        keys.ed.clone(),
        store,
        Arc::new(HashProver::without_bid()),
        Arc::new(NoopMempool),
        network,
    );
    runner.start_network(height);

    info!(height, "node started");
    let runner_task = tokio::spawn(runner.run(boot_actions));
    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    shutdown.shutdown();
    runner_task.await??;
    Ok(())
}
