//! Startup synchronisation: peer discovery, longest-chain pull, and
//! mempool warm-up.
//!
//! Both tasks run once when the node starts, after the listener is up.
//! The waits are deliberately coarse time-based synchronisation; responses
//! arrive through the normal gossip dispatch while this code sleeps.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use super::gossip;
use super::message::Command;
use crate::node::NodeState;

/// How long to wait for a round of responses to settle.
const RESPONSE_WAIT: Duration = Duration::from_millis(300);

/// Spacing between sequential single-block requests.
const BLOCK_PULL_SPACING: Duration = Duration::from_millis(200);

/// Discovers peers, finds the longest remote chain, and pulls the missing
/// blocks from its holder.
pub(crate) async fn sync_blocks(state: Arc<NodeState>) {
    discover_peers(&state).await;

    debug!("synchronization: searching for longest chain");
    let targets = { state.peers.lock().await.addrs() };
    for target in targets {
        gossip::send(&state, target, Command::GetLatestBlockId).await;
    }
    sleep(RESPONSE_WAIT).await;

    let local_tip = { state.chain.lock().await.latest_block_id() };
    // Strictly fresher peers only; on a tie the first one encountered wins.
    let best = {
        let peers = state.peers.lock().await;
        peers
            .peers()
            .iter()
            .find(|peer| peer.latest_block_id() > local_tip)
            .map(|peer| (peer.addr(), peer.latest_block_id()))
    };

    let Some((best_addr, remote_tip)) = best else {
        debug!("synchronization: did not find a fresher peer");
        return;
    };
    debug!(
        "synchronization: downloading blocks {}..={} from {}",
        local_tip + 1,
        remote_tip,
        best_addr
    );

    // Each response flows through the validator in gossip dispatch. A
    // block that fails there leaves the tip behind, and every later block
    // is rejected for the missing parent, so the pull fizzles out on its
    // own.
    for block_id in (local_tip + 1)..=remote_tip {
        if !state.running.load(Ordering::SeqCst) {
            return;
        }
        gossip::send(&state, best_addr, Command::GetBlock { block_id }).await;
        sleep(BLOCK_PULL_SPACING).await;
    }
}

/// Contacts known peers for their peer lists, then contacts newly learned
/// peers the same way. Growth stops when the table is full or a round
/// brings nothing new.
async fn discover_peers(state: &Arc<NodeState>) {
    debug!("synchronization: looking for peers");

    let mut contacted: HashSet<SocketAddr> = HashSet::new();
    loop {
        let fresh: Vec<SocketAddr> = {
            let peers = state.peers.lock().await;
            peers
                .addrs()
                .into_iter()
                .filter(|addr| !contacted.contains(addr))
                .collect()
        };
        if fresh.is_empty() {
            break;
        }

        for target in fresh {
            contacted.insert(target);
            gossip::send(state, target, Command::GetPeers).await;
        }
        sleep(RESPONSE_WAIT).await;

        if state.peers.lock().await.is_full() {
            break;
        }
    }
}

/// Warms the mempool by pulling pending transactions from every peer.
pub(crate) async fn sync_mempool(state: Arc<NodeState>) {
    debug!("synchronization: retrieving pending transactions");
    sleep(RESPONSE_WAIT).await;

    let targets = { state.peers.lock().await.addrs() };
    for target in targets {
        gossip::send(&state, target, Command::GetPendingCoinTxs).await;
        gossip::send(&state, target, Command::GetPendingProofTxs).await;
    }
}
