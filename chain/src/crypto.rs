//! SECP256k1 signing primitives.
//!
//! The chain treats ECDSA as a black box: a keypair produces 64-byte compact
//! signatures over 32-byte message digests, and verification takes the
//! 33-byte compressed public key that doubles as the on-chain [`Address`].
//! Everything curve-specific stays behind this module.

use std::fmt;

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature as EcdsaSignature, SigningKey, VerifyingKey};

use crate::types::{Address, Hash256, Signature, ADDRESS_LEN, SIGNATURE_LEN};

/// Error produced when private-key material cannot be parsed.
#[derive(Debug)]
pub enum KeyError {
    /// Not valid hex.
    BadEncoding,
    /// Hex decoded, but the scalar is not a valid SECP256k1 private key.
    BadScalar,
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::BadEncoding => write!(f, "private key is not valid hex"),
            KeyError::BadScalar => write!(f, "bytes do not form a valid SECP256k1 private key"),
        }
    }
}

impl std::error::Error for KeyError {}

/// A SECP256k1 keypair held for the lifetime of the process.
///
/// The signing half never leaves this struct; the public half is exposed as
/// the node's [`Address`].
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    address: Address,
}

impl Keypair {
    /// Builds a keypair from a hex-encoded 32-byte private scalar, the
    /// format the key file stores.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim()).map_err(|_| KeyError::BadEncoding)?;
        Self::from_bytes(&bytes)
    }

    /// Builds a keypair from a raw 32-byte private scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let signing_key = SigningKey::from_slice(bytes).map_err(|_| KeyError::BadScalar)?;
        let address = address_of(signing_key.verifying_key());
        Ok(Self {
            signing_key,
            address,
        })
    }

    /// The on-chain address backed by this keypair (compressed public key).
    pub fn address(&self) -> Address {
        self.address
    }

    /// Signs a 32-byte message digest, returning the compact signature.
    pub fn sign(&self, message: &Hash256) -> Signature {
        let signature: EcdsaSignature = self.signing_key.sign(message.as_bytes());
        let bytes: [u8; SIGNATURE_LEN] = signature.to_bytes().into();
        Signature(bytes)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        write!(f, "Keypair({}…)", &self.address.to_hex()[..8])
    }
}

fn address_of(verifying_key: &VerifyingKey) -> Address {
    let point = verifying_key.to_encoded_point(true);
    let bytes: [u8; ADDRESS_LEN] = point
        .as_bytes()
        .try_into()
        .expect("compressed SEC1 point is always 33 bytes");
    Address(bytes)
}

/// Verifies a compact signature over `message` against the public key an
/// [`Address`] carries.
///
/// Returns `false` for malformed keys and signatures as well as for honest
/// verification failures; the caller cannot distinguish the two, matching
/// how received transactions are judged.
pub fn verify_signature(address: &Address, message: &Hash256, signature: &Signature) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(address.as_bytes()) else {
        return false;
    };
    let Ok(signature) = EcdsaSignature::from_slice(signature.as_bytes()) else {
        return false;
    };
    verifying_key
        .verify(message.as_bytes(), &signature)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic test keypair; the scalar is arbitrary but fixed.
    pub(crate) fn test_keypair(seed: u8) -> Keypair {
        let mut bytes = [0u8; 32];
        bytes[31] = seed;
        bytes[0] = 1;
        Keypair::from_bytes(&bytes).expect("fixed scalar should be valid")
    }

    #[test]
    fn sign_then_verify_roundtrip() {
        let keypair = test_keypair(7);
        let message = Hash256::compute(b"payload");

        let signature = keypair.sign(&message);
        assert!(verify_signature(&keypair.address(), &message, &signature));
    }

    #[test]
    fn verify_rejects_wrong_message() {
        let keypair = test_keypair(7);
        let signature = keypair.sign(&Hash256::compute(b"payload"));

        let other = Hash256::compute(b"other payload");
        assert!(!verify_signature(&keypair.address(), &other, &signature));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let keypair = test_keypair(7);
        let impostor = test_keypair(8);
        let message = Hash256::compute(b"payload");

        let signature = keypair.sign(&message);
        assert!(!verify_signature(&impostor.address(), &message, &signature));
    }

    #[test]
    fn verify_tolerates_garbage_address() {
        // 33 bytes that are not a curve point must not panic.
        let garbage = Address([0xFF; ADDRESS_LEN]);
        let keypair = test_keypair(7);
        let message = Hash256::compute(b"payload");
        let signature = keypair.sign(&message);

        assert!(!verify_signature(&garbage, &message, &signature));
    }

    #[test]
    fn address_is_compressed_sec1() {
        let keypair = test_keypair(9);
        let prefix = keypair.address().as_bytes()[0];
        assert!(prefix == 0x02 || prefix == 0x03);
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(matches!(
            Keypair::from_hex("not hex at all"),
            Err(KeyError::BadEncoding)
        ));
        // All-zero scalar is outside the valid range.
        assert!(matches!(
            Keypair::from_hex(&"00".repeat(32)),
            Err(KeyError::BadScalar)
        ));
    }
}
