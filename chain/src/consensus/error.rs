//! Error types for block validation and production.

use std::fmt;

use crate::prover::ProverError;
use crate::types::state_tree::StateError;
use crate::types::{Hash256, TxError};

/// Error type returned when a block fails the consensus checks.
#[derive(Debug)]
pub enum ValidationError {
    /// The candidate does not extend the expected parent (wrong serial id,
    /// wrong parent hash, or a timestamp outside the allowed window).
    StaleBlock(&'static str),
    /// A recomputed digest disagrees with the one the block carries.
    HashMismatch(&'static str),
    /// An included transaction breaks its record-level rules.
    Transaction(TxError),
    /// An included transaction's signature does not authenticate.
    BadSignature,
    /// Replaying the body against the parent state broke balance rules.
    Balance(StateError),
    /// The block references a circuit this node does not carry.
    UnknownCircuit(Hash256),
    /// An embedded proof failed verification against the block binding.
    ProofRejected,
    /// The proving toolchain failed while judging an embedded proof.
    Prover(ProverError),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::StaleBlock(what) => write!(f, "stale block: {what}"),
            ValidationError::HashMismatch(what) => write!(f, "hash mismatch: {what}"),
            ValidationError::Transaction(e) => write!(f, "invalid transaction: {e}"),
            ValidationError::BadSignature => write!(f, "transaction signature does not verify"),
            ValidationError::Balance(e) => write!(f, "{e}"),
            ValidationError::UnknownCircuit(hash) => {
                write!(f, "unknown circuit {}", hash.to_hex())
            }
            ValidationError::ProofRejected => write!(f, "embedded proof failed verification"),
            ValidationError::Prover(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<TxError> for ValidationError {
    fn from(e: TxError) -> Self {
        ValidationError::Transaction(e)
    }
}

impl From<StateError> for ValidationError {
    fn from(e: StateError) -> Self {
        ValidationError::Balance(e)
    }
}

impl From<ProverError> for ValidationError {
    fn from(e: ProverError) -> Self {
        ValidationError::Prover(e)
    }
}

/// Error type returned when assembling a new block fails.
///
/// Production failures are operator-visible and leave the mempool and the
/// chain untouched; the draft is simply discarded.
#[derive(Debug)]
pub enum ProduceError {
    /// Applying a selected transaction broke balance rules.
    Balance(StateError),
    /// A selected transaction is malformed or unsigned.
    Transaction(TxError),
    /// A selected proof request names a circuit this node does not carry.
    UnknownCircuit(Hash256),
    /// The proving toolchain failed while generating a proof.
    Prover(ProverError),
    /// The finished block failed the node's own consensus check.
    Validation(ValidationError),
}

impl fmt::Display for ProduceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProduceError::Balance(e) => write!(f, "{e}"),
            ProduceError::Transaction(e) => write!(f, "invalid transaction: {e}"),
            ProduceError::UnknownCircuit(hash) => {
                write!(f, "unknown circuit {}", hash.to_hex())
            }
            ProduceError::Prover(e) => write!(f, "{e}"),
            ProduceError::Validation(e) => write!(f, "produced block failed validation: {e}"),
        }
    }
}

impl std::error::Error for ProduceError {}

impl From<StateError> for ProduceError {
    fn from(e: StateError) -> Self {
        ProduceError::Balance(e)
    }
}

impl From<TxError> for ProduceError {
    fn from(e: TxError) -> Self {
        ProduceError::Transaction(e)
    }
}

impl From<ProverError> for ProduceError {
    fn from(e: ProverError) -> Self {
        ProduceError::Prover(e)
    }
}

impl From<ValidationError> for ProduceError {
    fn from(e: ValidationError) -> Self {
        ProduceError::Validation(e)
    }
}
