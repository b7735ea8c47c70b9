//! Node configuration.
//!
//! A node reads a single JSON configuration file naming its own address,
//! the seed peers, protocol fees, the timestamp tolerance, and the full
//! encoded genesis block. Ambient sections (circuit root, metrics) default
//! when absent so a minimal config stays minimal. The listening port and
//! key file are process arguments, not configuration.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::types::Block;

/// Error produced while loading the configuration file.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The file is not the expected JSON shape.
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read configuration file: {e}"),
            ConfigError::Parse(e) => write!(f, "cannot parse configuration file: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug, Deserialize)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        // Safe to unwrap: this is a fixed, valid address literal.
        let addr: SocketAddr = "127.0.0.1:9898"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        Self {
            enabled: true,
            listen_addr: addr,
        }
    }
}

fn default_circuit_root() -> PathBuf {
    PathBuf::from("circuit")
}

/// Top-level configuration for a node.
#[derive(Clone, Debug, Deserialize)]
pub struct NodeConfig {
    /// The IP address this node binds and advertises.
    pub self_ip_address: String,
    /// Seed peers as `"ip:port"` strings, contacted at startup.
    pub seed_nodes: Vec<String>,
    /// Upper bound on the peer table size.
    pub max_peer_count: usize,
    /// How far into the future a block timestamp may lie, in milliseconds.
    pub time_difference_tolerance: u64,
    /// Flat fee charged per included coin transaction.
    pub coin_tx_fee: u64,
    /// Denominator of the `ceil(complexity / fee)` proof-pricing formula.
    pub proof_tx_fee: u64,
    /// The full encoded genesis block this network starts from.
    pub genesis_block: Block,
    /// Directory scanned for circuit subdirectories at startup.
    #[serde(default = "default_circuit_root")]
    pub circuit_root: PathBuf,
    /// Metrics exporter settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl NodeConfig {
    /// Loads and parses the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&contents).map_err(ConfigError::Parse)
    }
}
