//! Chain library crate.
//!
//! This crate provides the core building blocks for a peer-to-peer
//! blockchain node whose chain records verifiable outsourced computations
//! alongside plain value transfers:
//!
//! - strongly-typed domain types and the account state tree (`types`),
//! - SECP256k1 signing primitives (`crypto`),
//! - the chain, block validator, and block producer (`consensus`),
//! - pending-transaction pools (`mempool`),
//! - the proving-system abstraction and ZoKrates backend (`prover`),
//! - the wire protocol, gossip engine, and startup sync (`network`),
//! - the node runtime tying it all together (`node`),
//! - Prometheus-based metrics (`metrics`),
//! - and node configuration (`config`).
//!
//! Higher-level binaries compose these pieces into full nodes; the
//! `rpc-gateway` workspace member adds a JSON-RPC facade on top.

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod mempool;
pub mod metrics;
pub mod network;
pub mod node;
pub mod prover;
pub mod types;

// Re-export top-level configuration types.
pub use config::{ConfigError, MetricsConfig, NodeConfig};

// Re-export the consensus layer.
pub use consensus::{
    BlockProducer, BlockValidator, Chain, GenesisError, ProduceError, ValidationError,
};

// Re-export signing primitives.
pub use crypto::{verify_signature, KeyError, Keypair};

pub use mempool::Mempool;

// Re-export metrics registry and exporter.
pub use metrics::{run_prometheus_http_server, MetricsRegistry, NodeMetrics};

// Re-export the wire protocol surface.
pub use network::{Command, Envelope, Peer, PeerTable, WireError};

pub use node::{Node, NodeError};

// Re-export the proving abstraction and backends.
pub use prover::{CircuitRegistry, MockProver, Prover, ProverError, ZokratesProver};

// Re-export domain types at the crate root for convenience.
pub use types::*;
