//! Core domain types used by the chain
//!
//! This module defines strongly-typed hashes, addresses, and signatures that
//! are shared across the chain implementation. The goal is to avoid "naked"
//! byte buffers in public APIs and instead use domain-specific newtypes with
//! a fixed wire encoding (lowercase hex strings).

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

pub mod block;
pub mod coin_tx;
pub mod proof_tx;
pub mod state_tree;

pub use block::{Block, BlockBody, BlockHeader};
pub use coin_tx::CoinTransaction;
pub use proof_tx::{ProofBlob, ProofTransaction};
pub use state_tree::StateTree;

/// Length in bytes of all 256-bit hash types used in this module.
pub const HASH_LEN: usize = 32;

/// Length in bytes of an on-chain address (compressed SEC1 public key).
pub const ADDRESS_LEN: usize = 33;

/// Length in bytes of a compact ECDSA signature.
pub const SIGNATURE_LEN: usize = 64;

/// Error produced when a hex-encoded wire field fails to decode.
///
/// Past the codec boundary these conditions are unrepresentable: the
/// fixed-size newtypes below cannot hold a hash, address, or signature of
/// the wrong length.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// Not valid hex, or not exactly [`HASH_LEN`] bytes.
    BadHash,
    /// Not valid hex, or not exactly [`ADDRESS_LEN`] bytes.
    BadAddress,
    /// Not valid hex, or not exactly [`SIGNATURE_LEN`] bytes.
    BadSignature,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::BadHash => write!(f, "expected {} hex-encoded bytes of hash", HASH_LEN),
            DecodeError::BadAddress => {
                write!(f, "expected {} hex-encoded bytes of address", ADDRESS_LEN)
            }
            DecodeError::BadSignature => {
                write!(f, "expected {} hex-encoded bytes of signature", SIGNATURE_LEN)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

fn decode_fixed<const N: usize>(s: &str, err: DecodeError) -> Result<[u8; N], DecodeError> {
    let bytes = hex::decode(s).map_err(|_| err)?;
    bytes.try_into().map_err(|_| err)
}

/// Error produced when a transaction violates its own record-level rules,
/// independent of any chain state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxError {
    /// Transaction amount must be positive.
    BadAmount,
    /// Declared circuit complexity must be positive.
    BadComplexity,
    /// Sender and receiver addresses cannot be the same.
    SelfTransfer,
    /// The signing key's public half does not match the sender address.
    WrongSigner,
    /// Operation requires a signed transaction.
    Unsigned,
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxError::BadAmount => write!(f, "transaction amount has to be positive"),
            TxError::BadComplexity => write!(f, "circuit complexity has to be positive"),
            TxError::SelfTransfer => {
                write!(f, "sender and receiver addresses cannot be the same")
            }
            TxError::WrongSigner => {
                write!(f, "private key does not match the sender address")
            }
            TxError::Unsigned => write!(f, "transaction is not signed"),
        }
    }
}

impl std::error::Error for TxError {}

/// Serde adapter mapping an optional hex-encoded field to the wire, where
/// absence is spelled as the empty string.
pub(crate) mod hex_option {
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) trait HexField: Sized {
        fn to_hex_string(&self) -> String;
        fn parse_hex(s: &str) -> Result<Self, String>;
    }

    pub(crate) fn serialize<T: HexField, S: Serializer>(
        value: &Option<T>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&v.to_hex_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub(crate) fn deserialize<'de, T: HexField, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<T>, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Ok(None);
        }
        T::parse_hex(&s).map(Some).map_err(serde::de::Error::custom)
    }
}

impl hex_option::HexField for Signature {
    fn to_hex_string(&self) -> String {
        self.to_hex()
    }

    fn parse_hex(s: &str) -> Result<Self, String> {
        Signature::from_hex(s).map_err(|e| e.to_string())
    }
}

/// Strongly-typed 256-bit hash wrapper (SHA-256).
///
/// This type is used as the backing representation for all fixed-size
/// digests in the chain: transaction ids, signed-message hashes, circuit
/// identifiers, and the block hashes of the header chain. It is always
/// exactly [`HASH_LEN`] bytes long and encodes as lowercase hex.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// Computes a new [`Hash256`] as the SHA-256 digest of `data`.
    pub fn compute(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Hash256(digest.into())
    }

    /// Returns the underlying 32-byte digest as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Parses a hash from its lowercase-hex wire form.
    pub fn from_hex(s: &str) -> Result<Self, DecodeError> {
        decode_fixed(s, DecodeError::BadHash).map(Hash256)
    }

    /// Returns the lowercase-hex wire form of this hash.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The `previous_block_hash` of the genesis block: the ASCII bytes of
    /// 32 `'0'` characters, not a real digest.
    pub fn genesis_previous() -> Self {
        Hash256([b'0'; HASH_LEN])
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash256::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// On-chain account identity: a compressed SECP256k1 public key in SEC1
/// form, 33 bytes.
///
/// The raw compressed key is the identity; no shortened key-hash form is
/// used on-chain. Addresses order lexicographically on their raw bytes,
/// which is the order the state tree serialises them in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// Parses an address from its lowercase-hex wire form.
    pub fn from_hex(s: &str) -> Result<Self, DecodeError> {
        decode_fixed(s, DecodeError::BadAddress).map(Address)
    }

    /// Returns the lowercase-hex wire form of this address.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the raw SEC1 bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Compact SECP256k1 ECDSA signature, 64 bytes.
///
/// Signatures are detached and cover the signed-message hash defined by the
/// transaction layer, never a transaction's wire encoding.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Signature(pub [u8; SIGNATURE_LEN]);

impl Signature {
    /// Parses a signature from its lowercase-hex wire form.
    pub fn from_hex(s: &str) -> Result<Self, DecodeError> {
        decode_fixed(s, DecodeError::BadSignature).map(Signature)
    }

    /// Returns the lowercase-hex wire form of this signature.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the raw compact signature bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}…)", &self.to_hex()[..8])
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Signature::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Returns the current wall-clock time in milliseconds since the Unix
/// epoch. Falls back to 0 if the system clock is before the epoch.
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_millis(0))
        .as_millis() as u64
}
