//! Proving-system abstraction.
//!
//! The chain treats the proving toolchain as an opaque collaborator: given a
//! circuit directory, an input vector, and the block-binding tag, it either
//! produces a proof blob or judges one. This module defines:
//!
//! - the [`Prover`] trait the consensus layer programs against,
//! - [`ProverError`] for toolchain failures,
//! - the [`CircuitRegistry`] mapping on-chain circuit hashes to prepared
//!   circuit directories, and
//! - a [`MockProver`] for tests and for isolating consensus logic.
//!
//! The production implementation lives in [`zokrates`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::types::block::BindingTag;
use crate::types::{Hash256, ProofBlob};

pub mod zokrates;

pub use zokrates::ZokratesProver;

/// Errors that can occur while driving the external proving toolchain.
#[derive(Debug)]
pub enum ProverError {
    /// The toolchain binary could not be started at all.
    Launch(String),
    /// The toolchain ran but reported failure (non-zero exit).
    Execution(String),
    /// The toolchain produced output this node cannot interpret.
    Protocol(String),
}

impl fmt::Display for ProverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProverError::Launch(msg) => write!(f, "failed to launch prover: {msg}"),
            ProverError::Execution(msg) => write!(f, "prover failed: {msg}"),
            ProverError::Protocol(msg) => write!(f, "unexpected prover output: {msg}"),
        }
    }
}

impl std::error::Error for ProverError {}

/// Abstract proving backend used by the block producer and validator.
///
/// Implementations are blocking; callers inside the async runtime wrap
/// invocations in `tokio::task::spawn_blocking`, and must never hold the
/// chain lock across a call.
pub trait Prover: Send + Sync {
    /// Runs the named circuit on `inputs` with `binding` appended as the
    /// final public input and returns the resulting proof blob.
    fn generate(
        &self,
        circuit_dir: &Path,
        inputs: &str,
        binding: &BindingTag,
    ) -> Result<ProofBlob, ProverError>;

    /// Judges a proof blob against the same inputs and binding the producer
    /// used. `Ok(false)` is an honest rejection; `Err` is a toolchain
    /// failure.
    fn verify(
        &self,
        circuit_dir: &Path,
        blob: &ProofBlob,
        inputs: &str,
        binding: &BindingTag,
    ) -> Result<bool, ProverError>;
}

/// Mapping from on-chain circuit hashes to prepared circuit directories.
///
/// A circuit directory holds the compiled circuit, proving key,
/// verification key, and ABI; its on-chain name is the SHA-256 of the
/// circuit source file. Lookups that miss mean the block references a
/// circuit this node does not carry, which rejects the block.
#[derive(Clone, Debug, Default)]
pub struct CircuitRegistry {
    circuits: HashMap<Hash256, PathBuf>,
}

impl CircuitRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a prepared circuit directory under its source hash.
    pub fn insert(&mut self, circuit_hash: Hash256, dir: PathBuf) {
        self.circuits.insert(circuit_hash, dir);
    }

    /// Resolves a circuit hash to its prepared directory.
    pub fn circuit_dir(&self, circuit_hash: &Hash256) -> Option<&Path> {
        self.circuits.get(circuit_hash).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.circuits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.is_empty()
    }
}

/// The shape of a proof blob this node understands well enough to check the
/// binding: the public-input vector of the proving system's JSON document.
#[derive(Debug, Deserialize)]
struct BlobInputs {
    inputs: Vec<String>,
}

/// Extracts the last-but-one public input of a proof blob and compares it
/// against the binding tag.
///
/// Public inputs are 0x-prefixed, zero-padded field elements; comparison is
/// on the zero-trimmed lowercase hex value.
pub(crate) fn blob_matches_binding(blob: &ProofBlob, binding: &BindingTag) -> Result<bool, ProverError> {
    let parsed: BlobInputs = serde_json::from_str(blob.as_str())
        .map_err(|e| ProverError::Protocol(format!("proof blob is not valid JSON: {e}")))?;

    if parsed.inputs.len() < 2 {
        return Err(ProverError::Protocol(
            "proof blob carries fewer than two public inputs".to_string(),
        ));
    }

    let element = &parsed.inputs[parsed.inputs.len() - 2];
    let trimmed = element
        .trim_start_matches("0x")
        .trim_start_matches('0')
        .to_ascii_lowercase();
    let element_hex = if trimmed.is_empty() { "0".to_string() } else { trimmed };

    Ok(element_hex == binding.to_trimmed_hex())
}

/// A trivial in-process prover for tests and consensus isolation.
///
/// `generate` fabricates a blob whose public-input vector embeds the
/// binding in the last-but-one slot, exactly where the real toolchain puts
/// it; `verify` honours that slot, so binding-tampering tests behave as
/// they would against the real backend.
#[derive(Clone, Copy, Debug)]
pub struct MockProver {
    fail_generate: bool,
    verdict: bool,
}

impl MockProver {
    /// A prover whose proofs always verify (binding permitting).
    pub fn accepting() -> Self {
        Self {
            fail_generate: false,
            verdict: true,
        }
    }

    /// A prover whose proofs never verify.
    pub fn rejecting() -> Self {
        Self {
            fail_generate: false,
            verdict: false,
        }
    }

    /// A prover that fails outright during generation, as the real
    /// toolchain does when inputs do not satisfy the circuit.
    pub fn failing() -> Self {
        Self {
            fail_generate: true,
            verdict: true,
        }
    }
}

impl Prover for MockProver {
    fn generate(
        &self,
        _circuit_dir: &Path,
        inputs: &str,
        binding: &BindingTag,
    ) -> Result<ProofBlob, ProverError> {
        if self.fail_generate {
            return Err(ProverError::Execution(
                "inputs do not satisfy the circuit".to_string(),
            ));
        }

        let mut public_inputs: Vec<String> = inputs
            .split_whitespace()
            .map(|v| format!("0x{v}"))
            .collect();
        public_inputs.push(format!("0x{}", binding.to_trimmed_hex()));
        public_inputs.push("0x1".to_string());

        let blob = serde_json::json!({
            "scheme": "mock",
            "inputs": public_inputs,
        });
        Ok(ProofBlob(blob.to_string()))
    }

    fn verify(
        &self,
        _circuit_dir: &Path,
        blob: &ProofBlob,
        _inputs: &str,
        binding: &BindingTag,
    ) -> Result<bool, ProverError> {
        if !blob_matches_binding(blob, binding)? {
            return Ok(false);
        }
        Ok(self.verdict)
    }
}
