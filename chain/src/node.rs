//! Node runtime: process-wide state, task lifecycle, and the operator API.
//!
//! All mutable state the tasks share — the chain, the peer table, the
//! mempool, and the selected-for-next-block lists — lives in one
//! [`NodeState`] passed around explicitly behind an [`Arc`], one lock per
//! structure. The runtime owns a listener task spawning one handler per
//! inbound connection, plus the two startup sync tasks.
//!
//! Shutdown flips the running flag and opens a loopback connection to the
//! node's own listener to unblock `accept`, then joins every task.
//! In-flight connection handlers are short-lived and run to completion.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::consensus::{
    BlockProducer, BlockValidator, Chain, GenesisError, ProduceError, ValidationError,
};
use crate::crypto::Keypair;
use crate::mempool::Mempool;
use crate::metrics::MetricsRegistry;
use crate::network::gossip;
use crate::network::message::Command;
use crate::network::peer::{resolve_peer_addr, PeerTable};
use crate::network::sync;
use crate::prover::{CircuitRegistry, Prover, ProverError};
use crate::types::{current_time_millis, Address, Block, CoinTransaction, Hash256, ProofTransaction};

/// Default difficulty stamped into locally produced blocks.
const PRODUCED_BLOCK_DIFFICULTY: u64 = 1;

/// Errors surfaced by the node runtime and the operator API.
#[derive(Debug)]
pub enum NodeError {
    /// The configured genesis block is unusable; the node cannot start.
    Genesis(GenesisError),
    /// The configured `self_ip_address` does not resolve.
    BadSelfAddress(String),
    /// The listening socket could not be bound.
    Bind(std::io::Error),
    /// The operation needs a loaded private key, but the node runs in
    /// anonymous mode.
    Anonymous,
    /// Operator selection index is outside the mempool.
    IndexOutOfBounds,
    /// The transaction is already selected for the next block.
    AlreadySelected,
    /// The selected transaction does not verify.
    InvalidTransaction,
    /// A record-level error while creating a transaction.
    Transaction(crate::types::TxError),
    /// Block production failed; the draft was discarded.
    Produce(ProduceError),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Genesis(e) => write!(f, "{e}"),
            NodeError::BadSelfAddress(addr) => {
                write!(f, "configured self address {addr:?} does not resolve")
            }
            NodeError::Bind(e) => write!(f, "failed to bind listening socket: {e}"),
            NodeError::Anonymous => {
                write!(f, "operation requires a private key, node runs anonymously")
            }
            NodeError::IndexOutOfBounds => write!(f, "transaction index out of bounds"),
            NodeError::AlreadySelected => {
                write!(f, "transaction is already selected for the next block")
            }
            NodeError::InvalidTransaction => write!(f, "transaction does not verify"),
            NodeError::Transaction(e) => write!(f, "{e}"),
            NodeError::Produce(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for NodeError {}

impl From<GenesisError> for NodeError {
    fn from(e: GenesisError) -> Self {
        NodeError::Genesis(e)
    }
}

impl From<ProduceError> for NodeError {
    fn from(e: ProduceError) -> Self {
        NodeError::Produce(e)
    }
}

impl From<crate::types::TxError> for NodeError {
    fn from(e: crate::types::TxError) -> Self {
        NodeError::Transaction(e)
    }
}

/// Transactions the operator has confirmed for the next produced block.
#[derive(Debug, Default)]
pub(crate) struct SelectedTxs {
    pub(crate) coin_txs: Vec<CoinTransaction>,
    pub(crate) proof_txs: Vec<ProofTransaction>,
}

impl SelectedTxs {
    pub(crate) fn clear(&mut self) {
        self.coin_txs.clear();
        self.proof_txs.clear();
    }
}

/// Process-wide shared state, one lock per structure.
pub(crate) struct NodeState {
    pub(crate) config: NodeConfig,
    pub(crate) self_addr: SocketAddr,
    pub(crate) port: u16,
    pub(crate) keypair: Option<Keypair>,
    pub(crate) chain: Mutex<Chain>,
    pub(crate) mempool: Mutex<Mempool>,
    pub(crate) peers: Mutex<PeerTable>,
    pub(crate) selected: Mutex<SelectedTxs>,
    pub(crate) running: AtomicBool,
    pub(crate) validator: BlockValidator,
    pub(crate) producer: BlockProducer,
    pub(crate) metrics: Arc<MetricsRegistry>,
}

/// Validates a candidate against the current tip and appends it.
///
/// The prover-heavy validation runs off the async threads and without the
/// chain lock; after it passes, the tip is re-checked under the lock so
/// the validate-and-append sequence stays serialised. On acceptance every
/// included transaction id is dropped from the mempool.
pub(crate) async fn import_block(
    state: &Arc<NodeState>,
    block: Block,
) -> Result<u64, ValidationError> {
    let parent = { state.chain.lock().await.tip().clone() };

    let validator = state.validator.clone();
    let parent_for_check = parent.clone();
    let candidate = block.clone();
    let now_ms = current_time_millis();
    let started = Instant::now();
    let verdict = tokio::task::spawn_blocking(move || {
        validator.validate(&parent_for_check, &candidate, now_ms)
    })
    .await
    .unwrap_or_else(|e| {
        Err(ValidationError::Prover(ProverError::Execution(format!(
            "validation task failed: {e}"
        ))))
    });
    state
        .metrics
        .node
        .block_validation_seconds
        .observe(started.elapsed().as_secs_f64());
    verdict?;

    {
        let mut chain = state.chain.lock().await;
        if chain.tip().current_block_hash() != parent.current_block_hash() {
            // Another block won the race at this height; first one wins.
            return Err(ValidationError::StaleBlock("tip advanced during validation"));
        }
        chain.append(block.clone());
    }

    {
        let mut mempool = state.mempool.lock().await;
        mempool.remove_included(&block);
        state
            .metrics
            .node
            .pending_coin_txs
            .set(mempool.coin_tx_count() as i64);
        state
            .metrics
            .node
            .pending_proof_txs
            .set(mempool.proof_tx_count() as i64);
    }

    state.metrics.node.blocks_accepted.inc();
    Ok(block.serial_id())
}

/// A running node.
///
/// Dropping the handle does not stop the tasks; call [`Node::shutdown`].
pub struct Node {
    state: Arc<NodeState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    /// Starts a node: binds the listener, seeds the peer table, and spawns
    /// the listener and the two startup sync tasks.
    ///
    /// `port` 0 binds an ephemeral port, which the returned handle reports
    /// via [`Node::local_addr`]. Without a keypair the node runs in
    /// anonymous mode: it relays and validates but cannot create
    /// transactions or produce blocks.
    pub async fn start(
        config: NodeConfig,
        port: u16,
        keypair: Option<Keypair>,
        prover: Arc<dyn Prover>,
        circuits: Arc<CircuitRegistry>,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<Node, NodeError> {
        let chain = Chain::new(config.genesis_block.clone())?;

        let bind_addr = (config.self_ip_address.as_str(), port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| NodeError::BadSelfAddress(config.self_ip_address.clone()))?;
        let listener = TcpListener::bind(bind_addr).await.map_err(NodeError::Bind)?;
        let self_addr = listener.local_addr().map_err(NodeError::Bind)?;

        let validator = BlockValidator::new(
            config.time_difference_tolerance,
            config.coin_tx_fee,
            config.proof_tx_fee,
            prover.clone(),
            circuits.clone(),
        );
        let producer = BlockProducer::new(
            config.coin_tx_fee,
            config.proof_tx_fee,
            PRODUCED_BLOCK_DIFFICULTY,
            prover,
            circuits,
        );

        let mut peers = PeerTable::new(config.max_peer_count);
        for seed in &config.seed_nodes {
            match resolve_peer_addr(seed) {
                Some(addr) if addr == self_addr => {}
                Some(addr) => {
                    peers.insert(addr);
                }
                None => warn!("seed node {seed:?} does not resolve, skipping"),
            }
        }
        metrics.node.peer_count.set(peers.len() as i64);

        let state = Arc::new(NodeState {
            config,
            self_addr,
            port: self_addr.port(),
            keypair,
            chain: Mutex::new(chain),
            mempool: Mutex::new(Mempool::new()),
            peers: Mutex::new(peers),
            selected: Mutex::new(SelectedTxs::default()),
            running: AtomicBool::new(true),
            validator,
            producer,
            metrics,
        });

        info!("node listening on {}", self_addr);

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(gossip::serve(state.clone(), listener)));
        tasks.push(tokio::spawn(sync::sync_blocks(state.clone())));
        tasks.push(tokio::spawn(sync::sync_mempool(state.clone())));

        Ok(Node {
            state,
            tasks: Mutex::new(tasks),
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.state.self_addr
    }

    /// The node's own address, if a keypair is loaded.
    pub fn address(&self) -> Option<Address> {
        self.state.keypair.as_ref().map(Keypair::address)
    }

    pub async fn latest_block_id(&self) -> u64 {
        self.state.chain.lock().await.latest_block_id()
    }

    pub async fn get_block(&self, serial_id: u64) -> Option<Block> {
        self.state.chain.lock().await.get(serial_id).cloned()
    }

    /// Balance of `address` in the tip's state.
    pub async fn balance(&self, address: &Address) -> u64 {
        self.state.chain.lock().await.tip().state_tree().get(address)
    }

    pub async fn pending_coin_txs(&self) -> Vec<CoinTransaction> {
        self.state.mempool.lock().await.coin_txs().to_vec()
    }

    pub async fn pending_proof_txs(&self) -> Vec<ProofTransaction> {
        self.state.mempool.lock().await.proof_txs().to_vec()
    }

    /// Canonical identity strings of every known peer.
    pub async fn peer_identities(&self) -> Vec<String> {
        self.state.peers.lock().await.identities()
    }

    /// Creates, signs, pools, and broadcasts a coin transaction.
    pub async fn submit_coin_tx(
        &self,
        address_to: Address,
        amount: u64,
    ) -> Result<CoinTransaction, NodeError> {
        let keypair = self.state.keypair.as_ref().ok_or(NodeError::Anonymous)?;
        let mut tx = CoinTransaction::new(keypair.address(), address_to, amount)?;
        tx.sign(keypair)?;

        self.pool_and_broadcast_coin_tx(tx.clone()).await;
        Ok(tx)
    }

    /// Creates, signs, pools, and broadcasts a proof request.
    pub async fn submit_proof_tx(
        &self,
        circuit_hash: Hash256,
        parameters: String,
        complexity: u64,
    ) -> Result<ProofTransaction, NodeError> {
        let keypair = self.state.keypair.as_ref().ok_or(NodeError::Anonymous)?;
        let mut tx =
            ProofTransaction::new(keypair.address(), circuit_hash, parameters, complexity)?;
        tx.sign(keypair)?;

        let inserted = {
            let mut mempool = self.state.mempool.lock().await;
            let inserted = mempool.insert_proof_tx(tx.clone());
            self.state
                .metrics
                .node
                .pending_proof_txs
                .set(mempool.proof_tx_count() as i64);
            inserted
        };
        if inserted {
            gossip::broadcast(
                &self.state,
                Command::BroadcastPendingProofTx { tx: tx.clone() },
                None,
            )
            .await;
        }
        Ok(tx)
    }

    async fn pool_and_broadcast_coin_tx(&self, tx: CoinTransaction) {
        let inserted = {
            let mut mempool = self.state.mempool.lock().await;
            let inserted = mempool.insert_coin_tx(tx.clone());
            self.state
                .metrics
                .node
                .pending_coin_txs
                .set(mempool.coin_tx_count() as i64);
            inserted
        };
        if inserted {
            gossip::broadcast(&self.state, Command::BroadcastPendingCoinTx { tx }, None).await;
        }
    }

    /// Confirms the pending coin transaction at `index` for the next
    /// produced block.
    pub async fn select_coin_tx(&self, index: usize) -> Result<(), NodeError> {
        if self.state.keypair.is_none() {
            return Err(NodeError::Anonymous);
        }
        let tx = self
            .state
            .mempool
            .lock()
            .await
            .coin_tx_at(index)
            .cloned()
            .ok_or(NodeError::IndexOutOfBounds)?;

        let mut selected = self.state.selected.lock().await;
        if selected.coin_txs.iter().any(|t| t.id() == tx.id()) {
            return Err(NodeError::AlreadySelected);
        }
        if !tx.verify() {
            return Err(NodeError::InvalidTransaction);
        }
        selected.coin_txs.push(tx);
        Ok(())
    }

    /// Confirms the pending proof transaction at `index` for the next
    /// produced block.
    pub async fn select_proof_tx(&self, index: usize) -> Result<(), NodeError> {
        if self.state.keypair.is_none() {
            return Err(NodeError::Anonymous);
        }
        let tx = self
            .state
            .mempool
            .lock()
            .await
            .proof_tx_at(index)
            .cloned()
            .ok_or(NodeError::IndexOutOfBounds)?;

        let mut selected = self.state.selected.lock().await;
        if selected.proof_txs.iter().any(|t| t.id() == tx.id()) {
            return Err(NodeError::AlreadySelected);
        }
        if !tx.verify() {
            return Err(NodeError::InvalidTransaction);
        }
        selected.proof_txs.push(tx);
        Ok(())
    }

    /// Numbers of selected coin and proof transactions.
    pub async fn selected_counts(&self) -> (usize, usize) {
        let selected = self.state.selected.lock().await;
        (selected.coin_txs.len(), selected.proof_txs.len())
    }

    /// Produces a block from the selected transactions: replays them on the
    /// tip's state, proves every included request against the block
    /// binding, self-validates, appends, and broadcasts.
    ///
    /// On any failure the draft is discarded, the selection and mempool are
    /// untouched, and the error is returned for the operator to read.
    pub async fn produce_block(&self) -> Result<Block, NodeError> {
        let keypair = self.state.keypair.as_ref().ok_or(NodeError::Anonymous)?;
        let miner = keypair.address();

        let parent = { self.state.chain.lock().await.tip().clone() };
        let (coin_txs, proof_txs) = {
            let selected = self.state.selected.lock().await;
            (selected.coin_txs.clone(), selected.proof_txs.clone())
        };

        let producer = self.state.producer.clone();
        let timestamp = current_time_millis();
        let proving_started = Instant::now();
        let block = tokio::task::spawn_blocking(move || {
            producer.build_block(&parent, coin_txs, proof_txs, miner, timestamp)
        })
        .await
        .unwrap_or_else(|e| {
            Err(ProduceError::Prover(ProverError::Execution(format!(
                "production task failed: {e}"
            ))))
        })?;
        self.state
            .metrics
            .node
            .proof_generation_seconds
            .observe(proving_started.elapsed().as_secs_f64());

        // Full self-check against the tip before anything leaves the node.
        import_block(&self.state, block.clone())
            .await
            .map_err(|e| NodeError::Produce(ProduceError::Validation(e)))?;

        self.state.selected.lock().await.clear();

        gossip::broadcast(
            &self.state,
            Command::BroadcastBlock {
                block: block.clone(),
            },
            None,
        )
        .await;

        info!(
            "produced block {} with hash {}",
            block.serial_id(),
            block.current_block_hash().to_hex()
        );
        Ok(block)
    }

    /// Stops the node: flips the running flag, unblocks the listener with a
    /// loopback connection, and joins every task.
    pub async fn shutdown(&self) {
        self.state.running.store(false, Ordering::SeqCst);

        if let Err(e) = TcpStream::connect(self.state.self_addr).await {
            warn!("failed to open terminating connection: {e}");
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("task failed during shutdown: {e}");
            }
        }
        info!("node terminated");
    }
}
