// rpc-gateway/src/main.rs

//! JSON-RPC gateway binary.
//!
//! This binary embeds a full chain node (listener, gossip, sync, prover)
//! and exposes a small HTTP API on top of it:
//!
//! - `GET /health`
//! - `POST /` with `{id, method, params}` for the read-only queries
//!   (`GET_LATEST_BLOCK_ID`, `GET_BLOCK`, `GET_PENDING_COIN_TXS`,
//!   `GET_PENDING_PROOF_TXS`)
//!
//! The gateway participates in the peer protocol like any other node; the
//! HTTP side is a read-only window for wallets and dashboards.

mod config;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use tokio::signal;

use chain::{
    run_prometheus_http_server, Keypair, MetricsRegistry, Node, NodeConfig, Prover, ZokratesProver,
};
use config::ApiConfig;
use routes::{health, rpc};
use state::{AppState, SharedState};

#[derive(Debug, Parser)]
#[command(name = "rpc-gateway", about = "JSON-RPC facade over a chain node")]
struct Args {
    /// Port the embedded node's peer-protocol listener binds.
    #[arg(short, long, default_value_t = 2222)]
    port: u16,

    /// Hex-encoded private key file; omit to run the node anonymously.
    #[arg(short, long)]
    key: Option<PathBuf>,

    /// JSON configuration file for the embedded node.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Address the JSON-RPC server binds.
    #[arg(long)]
    listen: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() {
    // Basic tracing setup.
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "rpc_gateway=info,chain=info".to_string()),
        )
        .init();

    if let Err(e) = run(Args::parse()).await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), String> {
    let mut api_cfg = ApiConfig::default();
    if let Some(listen) = args.listen {
        api_cfg.listen_addr = listen;
    }

    let node_cfg = NodeConfig::load(&args.config)
        .map_err(|e| format!("failed to load configuration: {e}"))?;

    let keypair = match &args.key {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| format!("failed to read key file: {e}"))?;
            Some(Keypair::from_hex(&contents).map_err(|e| format!("failed to load key: {e}"))?)
        }
        None => None,
    };

    // ---------------------------
    // Metrics
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new()
            .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if node_cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = node_cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                tracing::error!("metrics HTTP server error: {e}");
            }
        });
        tracing::info!("metrics exporter listening on http://{addr}/metrics");
    }

    // ---------------------------
    // Proving toolchain + node
    // ---------------------------

    let zokrates = ZokratesProver::new();
    if let Err(e) = zokrates.check_version() {
        tracing::warn!("proving toolchain check failed: {e}");
    }
    let circuits = Arc::new(zokrates.discover(&node_cfg.circuit_root));
    let prover: Arc<dyn Prover> = Arc::new(zokrates);

    let node = Node::start(node_cfg, args.port, keypair, prover, circuits, metrics)
        .await
        .map_err(|e| format!("failed to start node: {e}"))?;
    tracing::info!("embedded node listening on {}", node.local_addr());

    // ---------------------------
    // HTTP router
    // ---------------------------

    let app_state: SharedState = Arc::new(AppState { node });

    let app = Router::new()
        .route("/health", get(health::health))
        .route("/", post(rpc::dispatch))
        .with_state(app_state.clone());

    tracing::info!("JSON-RPC gateway listening on http://{}", api_cfg.listen_addr);

    let listener = tokio::net::TcpListener::bind(api_cfg.listen_addr)
        .await
        .map_err(|e| format!("failed to bind RPC listener: {e}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("failed to wait for shutdown signal: {e}");
            }
        })
        .await
        .map_err(|e| format!("RPC server error: {e}"))?;

    tracing::info!("shutting down");
    app_state.node.shutdown().await;
    Ok(())
}
