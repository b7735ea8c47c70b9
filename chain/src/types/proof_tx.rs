//! Proof transactions: requests for verifiable outsourced computation.
//!
//! A requester names a circuit by content hash, supplies the input vector
//! and the circuit's declared constraint count, signs the request, and
//! broadcasts it. The proof blob itself is attached later, by whichever
//! block producer includes the request, and never by the requester. The
//! signature therefore covers every field except `proof`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crypto::{self, Keypair};
use crate::prover::{Prover, ProverError};
use crate::types::block::BindingTag;
use crate::types::{current_time_millis, hex_option, Address, Hash256, Signature, TxError};

/// Opaque proof material produced by the proving system, stored as the
/// UTF-8 text the prover emitted (a JSON document for the ZoKrates
/// backend). On the wire it travels as hex of those bytes, with absence
/// spelled as the empty string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProofBlob(pub String);

impl ProofBlob {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl hex_option::HexField for ProofBlob {
    fn to_hex_string(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    fn parse_hex(s: &str) -> Result<Self, String> {
        let bytes = hex::decode(s).map_err(|e| format!("proof blob is not valid hex: {e}"))?;
        let text =
            String::from_utf8(bytes).map_err(|_| "proof blob is not valid UTF-8".to_string())?;
        Ok(ProofBlob(text))
    }
}

/// A signed request to compute a named circuit on given inputs.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProofTransaction {
    id: Hash256,
    address_from: Address,
    /// SHA-256 of the circuit's source file, the circuit's on-chain name.
    circuit_hash: Hash256,
    /// Whitespace-separated input vector, passed verbatim to the prover.
    parameters: String,
    /// Declared constraint count of the named circuit; prices the request.
    complexity: u64,
    #[serde(with = "hex_option")]
    proof: Option<ProofBlob>,
    #[serde(with = "hex_option")]
    signature: Option<Signature>,
}

impl ProofTransaction {
    /// Creates a new unsigned proof request, stamping its id from the
    /// current wall-clock time.
    pub fn new(
        address_from: Address,
        circuit_hash: Hash256,
        parameters: String,
        complexity: u64,
    ) -> Result<Self, TxError> {
        let timestamp = current_time_millis();
        let serialized = format!(
            "{}|{}|{}|{}",
            timestamp,
            address_from.to_hex(),
            circuit_hash.to_hex(),
            parameters
        );

        let tx = Self {
            id: Hash256::compute(serialized.as_bytes()),
            address_from,
            circuit_hash,
            parameters,
            complexity,
            proof: None,
            signature: None,
        };
        tx.check_validity()?;
        Ok(tx)
    }

    /// Record-level validity: positive declared complexity.
    pub fn check_validity(&self) -> Result<(), TxError> {
        if self.complexity == 0 {
            return Err(TxError::BadComplexity);
        }
        Ok(())
    }

    /// The signed message: a digest over every field except `proof`, so a
    /// request can be signed and broadcast before any prover is invoked and
    /// the digest is stable across proving.
    pub fn hash(&self) -> Hash256 {
        let serialized = format!(
            "{}|{}|{}|{}|{}",
            self.id.to_hex(),
            self.address_from.to_hex(),
            self.circuit_hash.to_hex(),
            self.parameters,
            self.complexity
        );
        Hash256::compute(serialized.as_bytes())
    }

    /// Signs the request with `keypair`, whose address must equal the
    /// requester address.
    pub fn sign(&mut self, keypair: &Keypair) -> Result<(), TxError> {
        if keypair.address() != self.address_from {
            return Err(TxError::WrongSigner);
        }
        self.signature = Some(keypair.sign(&self.hash()));
        Ok(())
    }

    /// Returns `true` if the request is well-formed and its signature
    /// authenticates over [`ProofTransaction::hash`].
    pub fn verify(&self) -> bool {
        if self.check_validity().is_err() {
            return false;
        }
        match &self.signature {
            Some(signature) => crypto::verify_signature(&self.address_from, &self.hash(), signature),
            None => false,
        }
    }

    /// Digest binding the signed message to its signature, used only in the
    /// block-binding tag. Independent of `proof`.
    pub fn integrity(&self) -> Result<Hash256, TxError> {
        let signature = self.signature.ok_or(TxError::Unsigned)?;
        let mut preimage = Vec::with_capacity(96);
        preimage.extend_from_slice(self.hash().as_bytes());
        preimage.extend_from_slice(signature.as_bytes());
        Ok(Hash256::compute(&preimage))
    }

    /// Price of this request given the configured fee denominator:
    /// `ceil(complexity / fee_denominator)`.
    pub fn price(&self, fee_denominator: u64) -> u64 {
        self.complexity.div_ceil(fee_denominator.max(1))
    }

    /// Runs the prover on this request and attaches the resulting blob.
    ///
    /// Block-producer side only; `binding` ties the proof to the block
    /// under construction.
    pub fn prove(
        &mut self,
        prover: &dyn Prover,
        circuit_dir: &Path,
        binding: &BindingTag,
    ) -> Result<(), ProverError> {
        let blob = prover.generate(circuit_dir, &self.parameters, binding)?;
        self.proof = Some(blob);
        Ok(())
    }

    /// Verifies the attached proof blob against the same binding the
    /// producer used. Returns `false` when no proof is attached.
    pub fn validate(
        &self,
        prover: &dyn Prover,
        circuit_dir: &Path,
        binding: &BindingTag,
    ) -> Result<bool, ProverError> {
        match &self.proof {
            Some(blob) => prover.verify(circuit_dir, blob, &self.parameters, binding),
            None => Ok(false),
        }
    }

    pub fn id(&self) -> &Hash256 {
        &self.id
    }

    pub fn address_from(&self) -> &Address {
        &self.address_from
    }

    pub fn circuit_hash(&self) -> &Hash256 {
        &self.circuit_hash
    }

    pub fn parameters(&self) -> &str {
        &self.parameters
    }

    pub fn complexity(&self) -> u64 {
        self.complexity
    }

    pub fn proof(&self) -> Option<&ProofBlob> {
        self.proof.as_ref()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn is_proven(&self) -> bool {
        self.proof.is_some()
    }
}
