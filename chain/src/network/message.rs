//! Wire messages.
//!
//! Every message is a single JSON object with a `command` tag, the sender's
//! listening `port`, and command-specific payload fields at the top level.
//! Commands form a closed set; anything else fails to decode and is dropped
//! at the codec boundary, so raw JSON never travels past it.

use serde::{Deserialize, Serialize};

use crate::types::{Block, CoinTransaction, ProofTransaction};

/// The command tag plus its payload, one variant per protocol message.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum Command {
    /// Peer-exchange request.
    #[serde(rename = "GET_PEERS")]
    GetPeers,
    /// Peer-exchange response: known peers as `"ip:port"` strings.
    #[serde(rename = "PEERS")]
    Peers { peers: Vec<String> },

    /// Height query.
    #[serde(rename = "GET_LATEST_BLOCK_ID")]
    GetLatestBlockId,
    /// Height response.
    #[serde(rename = "LATEST_BLOCK_ID")]
    LatestBlockId { latest_id: u64 },

    /// Single-block fetch by serial id.
    #[serde(rename = "GET_BLOCK")]
    GetBlock { block_id: u64 },
    /// Single-block response.
    #[serde(rename = "BLOCK")]
    Block { block: Block },

    /// Mempool pull for pending coin transactions.
    #[serde(rename = "GET_PENDING_COIN_TXS")]
    GetPendingCoinTxs,
    #[serde(rename = "PENDING_COIN_TXS")]
    PendingCoinTxs { pending_txs: Vec<CoinTransaction> },

    /// Mempool pull for pending proof transactions.
    #[serde(rename = "GET_PENDING_PROOF_TXS")]
    GetPendingProofTxs,
    #[serde(rename = "PENDING_PROOF_TXS")]
    PendingProofTxs { pending_txs: Vec<ProofTransaction> },

    /// Unsolicited block gossip.
    #[serde(rename = "BROADCAST_BLOCK")]
    BroadcastBlock { block: Block },
    /// Unsolicited coin-transaction gossip.
    #[serde(rename = "BROADCAST_PENDING_COIN_TX")]
    BroadcastPendingCoinTx { tx: CoinTransaction },
    /// Unsolicited proof-transaction gossip.
    #[serde(rename = "BROADCAST_PENDING_PROOF_TX")]
    BroadcastPendingProofTx { tx: ProofTransaction },
}

impl Command {
    /// Response-typed commands are only honoured from known peers, which
    /// keeps unsolicited third parties from injecting chain data.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Command::Peers { .. }
                | Command::LatestBlockId { .. }
                | Command::Block { .. }
                | Command::PendingCoinTxs { .. }
                | Command::PendingProofTxs { .. }
        )
    }

    /// The wire tag, for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Command::GetPeers => "GET_PEERS",
            Command::Peers { .. } => "PEERS",
            Command::GetLatestBlockId => "GET_LATEST_BLOCK_ID",
            Command::LatestBlockId { .. } => "LATEST_BLOCK_ID",
            Command::GetBlock { .. } => "GET_BLOCK",
            Command::Block { .. } => "BLOCK",
            Command::GetPendingCoinTxs => "GET_PENDING_COIN_TXS",
            Command::PendingCoinTxs { .. } => "PENDING_COIN_TXS",
            Command::GetPendingProofTxs => "GET_PENDING_PROOF_TXS",
            Command::PendingProofTxs { .. } => "PENDING_PROOF_TXS",
            Command::BroadcastBlock { .. } => "BROADCAST_BLOCK",
            Command::BroadcastPendingCoinTx { .. } => "BROADCAST_PENDING_COIN_TX",
            Command::BroadcastPendingProofTx { .. } => "BROADCAST_PENDING_PROOF_TX",
        }
    }
}

/// One on-wire message: the sender's listening port plus the command.
///
/// The port lets the receiver identify the peer behind the ephemeral TCP
/// socket: the canonical sender identity is the socket's source IP combined
/// with this advertised port.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub port: u16,
    #[serde(flatten)]
    pub command: Command,
}
