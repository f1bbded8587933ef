//! Node configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Environment-specific protocol magic. Connections close on mismatch.
    pub magic: [u8; 4],
    /// Listen address for inbound peers.
    pub listen_addr: String,
    /// Peers to dial at startup.
    pub peers: Vec<String>,
    /// Total inbound queue bound.
    pub inbound_capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            magic: [0x73, 0x62, 0x61, 0x00],
            listen_addr: "0.0.0.0:7045".to_string(),
            peers: Vec::new(),
            inbound_capacity: crate::inbound::DEFAULT_INBOUND_CAPACITY,
        }
    }
}

/// Top-level node settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Database directory.
    pub data_dir: PathBuf,
    pub network: NetworkConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./sba-data"),
            network: NetworkConfig::default(),
        }
    }
}
