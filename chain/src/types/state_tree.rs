//! Replicated account-balance state.
//!
//! The state tree maps addresses to non-negative balances. A zero balance is
//! indistinguishable from absence on reads, but a written key participates
//! in the canonical hash even at zero, so writes are always observable.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Address, CoinTransaction, Hash256, ProofTransaction};

/// Error produced when applying a transaction would break balance rules.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StateError {
    /// A debit would drive a balance below zero.
    InsufficientFunds,
    /// A credit would overflow the balance type.
    BalanceOverflow,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::InsufficientFunds => write!(f, "insufficient funds"),
            StateError::BalanceOverflow => write!(f, "balance overflow"),
        }
    }
}

impl std::error::Error for StateError {}

/// Account-balance mapping with a canonical, order-independent hash.
///
/// Backed by a `BTreeMap` so iteration is already in ascending address
/// order, which is the order the canonical serialisation requires. Block
/// producers and validators clone the parent state before applying
/// transactions, so a failed application leaves the parent untouched.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateTree {
    state: BTreeMap<Address, u64>,
}

impl StateTree {
    /// Creates an empty state tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the balance stored for `address`, or 0 when absent.
    pub fn get(&self, address: &Address) -> u64 {
        self.state.get(address).copied().unwrap_or(0)
    }

    /// Writes `value` for `address`.
    ///
    /// Writing 0 still defines the key: it shows up in [`StateTree::hash`]
    /// from then on.
    pub fn set(&mut self, address: Address, value: u64) {
        self.state.insert(address, value);
    }

    /// Number of defined keys (including explicit zeros).
    pub fn len(&self) -> usize {
        self.state.len()
    }

    /// Returns `true` if no key was ever written.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Sum of all balances, used by conservation checks in tests.
    pub fn total(&self) -> u64 {
        self.state.values().sum()
    }

    fn debit(&mut self, address: &Address, amount: u64) -> Result<(), StateError> {
        let balance = self.get(address);
        let new_balance = balance
            .checked_sub(amount)
            .ok_or(StateError::InsufficientFunds)?;
        self.set(*address, new_balance);
        Ok(())
    }

    fn credit(&mut self, address: &Address, amount: u64) -> Result<(), StateError> {
        let balance = self.get(address);
        let new_balance = balance
            .checked_add(amount)
            .ok_or(StateError::BalanceOverflow)?;
        self.set(*address, new_balance);
        Ok(())
    }

    /// Applies a coin transaction: the sender loses `amount + fee`, the
    /// receiver gains `amount`, the miner gains `fee`.
    ///
    /// Deltas are applied in order without rollback; callers work on a clone
    /// of the parent state and discard it on error.
    pub fn apply_coin_tx(
        &mut self,
        tx: &CoinTransaction,
        fee: u64,
        miner: &Address,
    ) -> Result<(), StateError> {
        let debit_total = tx
            .amount()
            .checked_add(fee)
            .ok_or(StateError::BalanceOverflow)?;
        self.debit(tx.address_from(), debit_total)?;
        self.credit(tx.address_to(), tx.amount())?;
        self.credit(miner, fee)?;
        Ok(())
    }

    /// Applies a proof transaction: the requester pays
    /// `ceil(complexity / fee_denominator)` to the miner.
    pub fn apply_proof_tx(
        &mut self,
        tx: &ProofTransaction,
        fee_denominator: u64,
        miner: &Address,
    ) -> Result<(), StateError> {
        let price = tx.price(fee_denominator);
        self.debit(tx.address_from(), price)?;
        self.credit(miner, price)?;
        Ok(())
    }

    /// Canonical digest of the tree contents.
    ///
    /// The preimage is `"<addr_hex>:<value>"` for every defined key, joined
    /// by `"|"` in ascending address-byte order. Two trees with identical
    /// contents hash identically regardless of insertion order.
    pub fn hash(&self) -> Hash256 {
        let serialized = self
            .state
            .iter()
            .map(|(address, value)| format!("{}:{}", address.to_hex(), value))
            .collect::<Vec<_>>()
            .join("|");
        Hash256::compute(serialized.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ADDRESS_LEN;

    fn dummy_address(byte: u8) -> Address {
        Address([byte; ADDRESS_LEN])
    }

    #[test]
    fn get_on_absent_address_returns_zero() {
        let tree = StateTree::new();
        assert_eq!(tree.get(&dummy_address(1)), 0);
    }

    #[test]
    fn set_then_get_roundtrip() {
        let mut tree = StateTree::new();
        tree.set(dummy_address(1), 1_000);
        assert_eq!(tree.get(&dummy_address(1)), 1_000);
    }

    #[test]
    fn hash_is_insertion_order_independent() {
        let mut a = StateTree::new();
        a.set(dummy_address(1), 10);
        a.set(dummy_address(2), 20);

        let mut b = StateTree::new();
        b.set(dummy_address(2), 20);
        b.set(dummy_address(1), 10);

        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn zero_write_is_observable_in_hash() {
        let empty = StateTree::new();
        let mut written = StateTree::new();
        written.set(dummy_address(1), 0);

        assert_eq!(written.get(&dummy_address(1)), 0);
        assert_ne!(empty.hash(), written.hash());
    }

    #[test]
    fn debit_below_zero_is_insufficient_funds() {
        let mut tree = StateTree::new();
        tree.set(dummy_address(1), 5);
        assert_eq!(
            tree.debit(&dummy_address(1), 6),
            Err(StateError::InsufficientFunds)
        );
    }

    #[test]
    fn clone_leaves_original_untouched() {
        let mut original = StateTree::new();
        original.set(dummy_address(1), 100);

        let mut copy = original.clone();
        copy.set(dummy_address(1), 1);
        copy.set(dummy_address(2), 99);

        assert_eq!(original.get(&dummy_address(1)), 100);
        assert_eq!(original.get(&dummy_address(2)), 0);
    }

    #[test]
    fn wire_encoding_is_hex_keyed_object() {
        let mut tree = StateTree::new();
        tree.set(dummy_address(0xAB), 42);

        let json = serde_json::to_value(&tree).expect("state tree should serialize");
        let expected_key = "ab".repeat(ADDRESS_LEN);
        assert_eq!(json[&expected_key], 42);

        let back: StateTree = serde_json::from_value(json).expect("state tree should deserialize");
        assert_eq!(back, tree);
    }
}
