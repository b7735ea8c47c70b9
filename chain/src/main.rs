// chain/src/main.rs

//! Node binary.
//!
//! Wires up the chain library into a running peer:
//!
//! - JSON configuration file with the genesis block and protocol fees
//! - ZoKrates proving toolchain, with circuits discovered at startup
//! - TCP listener + gossip + startup sync
//! - Prometheus metrics exporter on /metrics
//!
//! The listening port and the private key file are process arguments; a
//! node started without a key runs anonymously and cannot create
//! transactions or produce blocks. The interactive shell and the JSON-RPC
//! facade live outside this binary.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;

use chain::{
    run_prometheus_http_server, Keypair, MetricsRegistry, Node, NodeConfig, Prover, ZokratesProver,
};

#[derive(Debug, Parser)]
#[command(name = "chain", about = "Proof-marketplace blockchain node")]
struct Args {
    /// Port the peer-protocol listener binds.
    #[arg(short, long, default_value_t = 2222)]
    port: u16,

    /// Hex-encoded private key file; omit to run in anonymous mode.
    #[arg(short, long)]
    key: Option<PathBuf>,

    /// JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "chain=info".to_string()),
        )
        .init();

    if let Err(err) = run(Args::parse()).await {
        eprintln!("fatal error: {err}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), String> {
    let config =
        NodeConfig::load(&args.config).map_err(|e| format!("failed to load configuration: {e}"))?;

    let keypair = match &args.key {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| format!("failed to read key file: {e}"))?;
            let keypair =
                Keypair::from_hex(&contents).map_err(|e| format!("failed to load key: {e}"))?;
            tracing::info!("your address: {}", keypair.address().to_hex());
            Some(keypair)
        }
        None => {
            tracing::info!(
                "private key file was not provided, running in anonymous mode -- \
                 transactions cannot be created"
            );
            None
        }
    };

    // ---------------------------
    // Proving toolchain + circuits
    // ---------------------------

    let zokrates = ZokratesProver::new();
    match zokrates.check_version() {
        Ok(version) => tracing::info!("zokrates {version} detected"),
        Err(e) => tracing::warn!("proving toolchain check failed: {e}"),
    }

    let circuits = Arc::new(zokrates.discover(&config.circuit_root));
    tracing::info!("prepared {} circuit(s)", circuits.len());

    let prover: Arc<dyn Prover> = Arc::new(zokrates);

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new().map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if config.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = config.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                tracing::error!("metrics HTTP server error: {e}");
            }
        });
        tracing::info!("metrics exporter listening on http://{addr}/metrics");
    }

    // ---------------------------
    // Node runtime
    // ---------------------------

    let node = Node::start(config, args.port, keypair, prover, circuits, metrics)
        .await
        .map_err(|e| format!("failed to start node: {e}"))?;

    tracing::info!("peer protocol listening on {}", node.local_addr());

    signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to wait for shutdown signal: {e}"))?;
    tracing::info!("shutting down");
    node.shutdown().await;

    Ok(())
}
