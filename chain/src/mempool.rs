//! Pending-transaction pools.
//!
//! Two unordered collections of transactions awaiting inclusion, indexed by
//! transaction id for deduplication and by position for operator selection.
//! No ordering guarantees and no capacity cap.

use std::collections::HashSet;

use crate::types::{Block, CoinTransaction, Hash256, ProofTransaction};

/// Pending coin and proof transactions.
#[derive(Clone, Debug, Default)]
pub struct Mempool {
    pending_coin_txs: Vec<CoinTransaction>,
    pending_proof_txs: Vec<ProofTransaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a coin transaction unless one with the same id is already
    /// pending. Returns `true` if the pool changed.
    pub fn insert_coin_tx(&mut self, tx: CoinTransaction) -> bool {
        if self.contains_coin_tx(tx.id()) {
            return false;
        }
        self.pending_coin_txs.push(tx);
        true
    }

    /// Inserts a proof transaction unless one with the same id is already
    /// pending. Returns `true` if the pool changed.
    pub fn insert_proof_tx(&mut self, tx: ProofTransaction) -> bool {
        if self.contains_proof_tx(tx.id()) {
            return false;
        }
        self.pending_proof_txs.push(tx);
        true
    }

    pub fn contains_coin_tx(&self, id: &Hash256) -> bool {
        self.pending_coin_txs.iter().any(|tx| tx.id() == id)
    }

    pub fn contains_proof_tx(&self, id: &Hash256) -> bool {
        self.pending_proof_txs.iter().any(|tx| tx.id() == id)
    }

    pub fn coin_txs(&self) -> &[CoinTransaction] {
        &self.pending_coin_txs
    }

    pub fn proof_txs(&self) -> &[ProofTransaction] {
        &self.pending_proof_txs
    }

    /// Positional lookup used by operator selection.
    pub fn coin_tx_at(&self, index: usize) -> Option<&CoinTransaction> {
        self.pending_coin_txs.get(index)
    }

    /// Positional lookup used by operator selection.
    pub fn proof_tx_at(&self, index: usize) -> Option<&ProofTransaction> {
        self.pending_proof_txs.get(index)
    }

    /// Drops every pending transaction whose id appears in an accepted
    /// block.
    pub fn remove_included(&mut self, block: &Block) {
        let coin_ids: HashSet<&Hash256> =
            block.body().coin_txs().iter().map(CoinTransaction::id).collect();
        let proof_ids: HashSet<&Hash256> =
            block.body().proof_txs().iter().map(ProofTransaction::id).collect();

        self.pending_coin_txs.retain(|tx| !coin_ids.contains(tx.id()));
        self.pending_proof_txs.retain(|tx| !proof_ids.contains(tx.id()));
    }

    pub fn coin_tx_count(&self) -> usize {
        self.pending_coin_txs.len()
    }

    pub fn proof_tx_count(&self) -> usize {
        self.pending_proof_txs.len()
    }
}
