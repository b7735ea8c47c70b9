//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and a set of strongly-typed node metrics, and an async HTTP
//! exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    body::Incoming, header, server::conn::http1, service::service_fn, Method, Request, Response,
    StatusCode,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

/// Node-level Prometheus metrics.
///
/// These are registered into a [`Registry`] and updated from the consensus
/// and gossip code.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Latency of full block validation, proofs included, in seconds.
    pub block_validation_seconds: Histogram,
    /// Time spent generating proofs for one produced block, in seconds.
    pub proof_generation_seconds: Histogram,
    /// Blocks accepted onto the local chain (produced or received).
    pub blocks_accepted: IntCounter,
    /// Received blocks rejected by the validator.
    pub blocks_rejected: IntCounter,
    /// Current size of the peer table.
    pub peer_count: IntGauge,
    /// Pending coin transactions in the mempool.
    pub pending_coin_txs: IntGauge,
    /// Pending proof transactions in the mempool.
    pub pending_proof_txs: IntGauge,
}

impl NodeMetrics {
    /// Registers node metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let block_validation_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "node_block_validation_seconds",
                "Time to fully validate a block, embedded proofs included, in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ]),
        )?;
        registry.register(Box::new(block_validation_seconds.clone()))?;

        let proof_generation_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "node_proof_generation_seconds",
                "Time spent generating proofs for one produced block in seconds",
            )
            .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        )?;
        registry.register(Box::new(proof_generation_seconds.clone()))?;

        let blocks_accepted = IntCounter::with_opts(Opts::new(
            "node_blocks_accepted",
            "Total number of blocks appended to the local chain",
        ))?;
        registry.register(Box::new(blocks_accepted.clone()))?;

        let blocks_rejected = IntCounter::with_opts(Opts::new(
            "node_blocks_rejected",
            "Total number of received blocks the validator rejected",
        ))?;
        registry.register(Box::new(blocks_rejected.clone()))?;

        let peer_count = IntGauge::with_opts(Opts::new(
            "node_peer_count",
            "Current number of peers in the peer table",
        ))?;
        registry.register(Box::new(peer_count.clone()))?;

        let pending_coin_txs = IntGauge::with_opts(Opts::new(
            "node_pending_coin_txs",
            "Pending coin transactions in the mempool",
        ))?;
        registry.register(Box::new(pending_coin_txs.clone()))?;

        let pending_proof_txs = IntGauge::with_opts(Opts::new(
            "node_pending_proof_txs",
            "Pending proof transactions in the mempool",
        ))?;
        registry.register(Box::new(pending_proof_txs.clone()))?;

        Ok(Self {
            block_validation_seconds,
            proof_generation_seconds,
            blocks_accepted,
            blocks_rejected,
            peer_count,
            pending_coin_txs,
            pending_proof_txs,
        })
    }
}

/// Wrapper around a Prometheus registry and the node metrics.
///
/// This is the main handle you pass around in the node. It can be wrapped
/// in an [`Arc`] and shared across threads/tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub node: NodeMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the node metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("chain".to_string()), None)?;
        let node = NodeMetrics::register(&registry)?;
        Ok(Self { registry, node })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::error!("prometheus HTTP server error: {err}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = metrics.gather_text();
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body)))
                .unwrap())
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn node_metrics_register_and_record() {
        let registry = Registry::new();
        let metrics = NodeMetrics::register(&registry).expect("register metrics");

        metrics.block_validation_seconds.observe(0.123);
        metrics.proof_generation_seconds.observe(1.4);
        metrics.blocks_accepted.inc();
        metrics.blocks_rejected.inc();
        metrics.peer_count.set(3);
        metrics.pending_coin_txs.set(2);
        metrics.pending_proof_txs.set(1);

        let metric_families = registry.gather();
        assert!(!metric_families.is_empty());
    }

    #[test]
    fn metrics_registry_gather_text_works() {
        let registry = MetricsRegistry::new().expect("create metrics registry");
        registry.node.block_validation_seconds.observe(0.01);
        let text = registry.gather_text();
        assert!(text.contains("node_block_validation_seconds"));
    }
}
