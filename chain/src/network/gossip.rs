//! Gossip engine: inbound dispatch, response policy, and rebroadcast.
//!
//! One inbound TCP connection carries one message. The handler resolves
//! the sender's canonical identity from the socket's source IP and the
//! advertised port, applies the peer-table policy, and dispatches on the
//! command. Malformed messages, unknown commands, and responses from
//! unknown senders are dropped silently apart from a verbose log line —
//! a misbehaving sender is never disconnected or answered.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::codec;
use super::message::{Command, Envelope};
use super::peer::resolve_peer_addr;
use crate::node::{import_block, NodeState};

/// Accept loop: spawns one short-lived handler task per inbound
/// connection. Observes the running flag on every wake, so the loopback
/// connection the shutdown path opens is enough to stop it.
pub(crate) async fn serve(state: Arc<NodeState>, listener: TcpListener) {
    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                if !state.running.load(Ordering::SeqCst) {
                    break;
                }
                warn!("accept failed: {e}");
                continue;
            }
        };
        if !state.running.load(Ordering::SeqCst) {
            break;
        }

        let state = state.clone();
        tokio::spawn(async move {
            handle_connection(state, stream, remote.ip()).await;
        });
    }
    debug!("listener stopped");
}

async fn handle_connection(state: Arc<NodeState>, mut stream: TcpStream, sender_ip: IpAddr) {
    let envelope = match codec::read_envelope(&mut stream).await {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!("dropping inbound message: {e}");
            return;
        }
    };
    dispatch(&state, envelope, sender_ip).await;
}

/// Handles one decoded message from `sender_ip`.
pub(crate) async fn dispatch(state: &Arc<NodeState>, envelope: Envelope, sender_ip: IpAddr) {
    let sender = SocketAddr::new(sender_ip, envelope.port);
    debug!("received {} from {}", envelope.command.name(), sender);

    {
        let mut peers = state.peers.lock().await;
        if envelope.command.is_response() {
            // Replies are only honoured from peers we know; this blocks
            // injection from unsolicited third parties.
            if !peers.contains(&sender) {
                debug!(
                    "dropping {} from {} which is not a peer",
                    envelope.command.name(),
                    sender
                );
                return;
            }
        } else if sender != state.self_addr && peers.insert(sender) {
            debug!("added new peer {sender}");
        }
        state.metrics.node.peer_count.set(peers.len() as i64);
    }

    match envelope.command {
        Command::GetPeers => {
            let mut identities = { state.peers.lock().await.identities() };
            identities.push(state.self_addr.to_string());
            send(state, sender, Command::Peers { peers: identities }).await;
        }

        Command::Peers { peers: received } => {
            let mut table = state.peers.lock().await;
            for identity in received {
                let Some(addr) = resolve_peer_addr(&identity) else {
                    debug!("ignoring unresolvable peer identity {identity:?}");
                    continue;
                };
                if addr != state.self_addr {
                    table.insert(addr);
                }
            }
            state.metrics.node.peer_count.set(table.len() as i64);
        }

        Command::GetLatestBlockId => {
            let latest_id = { state.chain.lock().await.latest_block_id() };
            send(state, sender, Command::LatestBlockId { latest_id }).await;
        }

        Command::LatestBlockId { latest_id } => {
            state
                .peers
                .lock()
                .await
                .set_latest_block_id(&sender, latest_id);
        }

        Command::GetBlock { block_id } => {
            let block = { state.chain.lock().await.get(block_id).cloned() };
            match block {
                Some(block) => send(state, sender, Command::Block { block }).await,
                None => debug!("received request for block id {block_id} which is too high"),
            }
        }

        // Solicited single block, the sync path. Appended if it extends
        // the tip; never rebroadcast.
        Command::Block { block } => match import_block(state, block).await {
            Ok(serial_id) => debug!("received valid block {serial_id}"),
            Err(e) => debug!("received invalid block: {e}"),
        },

        Command::GetPendingCoinTxs => {
            let pending_txs = { state.mempool.lock().await.coin_txs().to_vec() };
            send(state, sender, Command::PendingCoinTxs { pending_txs }).await;
        }

        Command::PendingCoinTxs { pending_txs } => {
            let mut mempool = state.mempool.lock().await;
            for tx in pending_txs {
                if tx.verify() {
                    mempool.insert_coin_tx(tx);
                } else {
                    debug!("ignoring pending coin tx that does not verify");
                }
            }
            state
                .metrics
                .node
                .pending_coin_txs
                .set(mempool.coin_tx_count() as i64);
        }

        Command::GetPendingProofTxs => {
            let pending_txs = { state.mempool.lock().await.proof_txs().to_vec() };
            send(state, sender, Command::PendingProofTxs { pending_txs }).await;
        }

        Command::PendingProofTxs { pending_txs } => {
            let mut mempool = state.mempool.lock().await;
            for tx in pending_txs {
                if tx.verify() {
                    mempool.insert_proof_tx(tx);
                } else {
                    debug!("ignoring pending proof tx that does not verify");
                }
            }
            state
                .metrics
                .node
                .pending_proof_txs
                .set(mempool.proof_tx_count() as i64);
        }

        Command::BroadcastBlock { block } => match import_block(state, block.clone()).await {
            Ok(serial_id) => {
                info!("accepted broadcast block {serial_id}");
                broadcast(state, Command::BroadcastBlock { block }, Some(sender)).await;
            }
            Err(e) => {
                debug!("dropping broadcast block: {e}");
                state.metrics.node.blocks_rejected.inc();
            }
        },

        Command::BroadcastPendingCoinTx { tx } => {
            if !tx.verify() {
                debug!("dropping broadcast coin tx that does not verify");
                return;
            }
            let inserted = {
                let mut mempool = state.mempool.lock().await;
                let inserted = mempool.insert_coin_tx(tx.clone());
                state
                    .metrics
                    .node
                    .pending_coin_txs
                    .set(mempool.coin_tx_count() as i64);
                inserted
            };
            // Only first sightings propagate; duplicates die here.
            if inserted {
                broadcast(state, Command::BroadcastPendingCoinTx { tx }, Some(sender)).await;
            }
        }

        Command::BroadcastPendingProofTx { tx } => {
            if !tx.verify() {
                debug!("dropping broadcast proof tx that does not verify");
                return;
            }
            let inserted = {
                let mut mempool = state.mempool.lock().await;
                let inserted = mempool.insert_proof_tx(tx.clone());
                state
                    .metrics
                    .node
                    .pending_proof_txs
                    .set(mempool.proof_tx_count() as i64);
                inserted
            };
            if inserted {
                broadcast(state, Command::BroadcastPendingProofTx { tx }, Some(sender)).await;
            }
        }
    }
}

/// Sends one message to one peer. Failures are logged and skipped; the
/// peer stays in the table.
pub(crate) async fn send(state: &Arc<NodeState>, target: SocketAddr, command: Command) {
    let name = command.name();
    let envelope = Envelope {
        port: state.port,
        command,
    };
    match codec::send_envelope(target, &envelope).await {
        Ok(()) => debug!("sent {name} to {target}"),
        Err(e) => debug!("failed to send {name} to {target}: {e}"),
    }
}

/// Sends one message to every peer, optionally excluding the peer it came
/// from to suppress immediate ping-pong.
pub(crate) async fn broadcast(
    state: &Arc<NodeState>,
    command: Command,
    except: Option<SocketAddr>,
) {
    let targets = { state.peers.lock().await.addrs() };
    for target in targets {
        if Some(target) == except {
            continue;
        }
        send(state, target, command.clone()).await;
    }
}
