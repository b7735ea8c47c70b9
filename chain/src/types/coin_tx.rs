//! Coin transactions: plain value transfers between two addresses.

use serde::{Deserialize, Serialize};

use crate::crypto::{self, Keypair};
use crate::types::{current_time_millis, hex_option, Address, Hash256, Signature, TxError};

/// A signed transfer of `amount` coins from one address to another.
///
/// The `id` is fixed at creation time from a timestamp and the transfer
/// fields, so two otherwise identical transfers created at different times
/// stay distinguishable in the mempool. The signature covers
/// [`CoinTransaction::hash`], which includes the id.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CoinTransaction {
    id: Hash256,
    address_from: Address,
    address_to: Address,
    amount: u64,
    #[serde(with = "hex_option")]
    signature: Option<Signature>,
}

impl CoinTransaction {
    /// Creates a new unsigned transfer, stamping its id from the current
    /// wall-clock time.
    pub fn new(address_from: Address, address_to: Address, amount: u64) -> Result<Self, TxError> {
        let timestamp = current_time_millis();
        let serialized = format!(
            "{}|{}|{}|{}",
            timestamp,
            address_from.to_hex(),
            address_to.to_hex(),
            amount
        );

        let tx = Self {
            id: Hash256::compute(serialized.as_bytes()),
            address_from,
            address_to,
            amount,
            signature: None,
        };
        tx.check_validity()?;
        Ok(tx)
    }

    /// Record-level validity: positive amount, distinct endpoints.
    ///
    /// Re-run on received transactions, since decoding performs no checks
    /// beyond field shape.
    pub fn check_validity(&self) -> Result<(), TxError> {
        if self.amount == 0 {
            return Err(TxError::BadAmount);
        }
        if self.address_from == self.address_to {
            return Err(TxError::SelfTransfer);
        }
        Ok(())
    }

    /// The signed message: a digest over id and transfer fields.
    pub fn hash(&self) -> Hash256 {
        let serialized = format!(
            "{}|{}|{}|{}",
            self.id.to_hex(),
            self.address_from.to_hex(),
            self.address_to.to_hex(),
            self.amount
        );
        Hash256::compute(serialized.as_bytes())
    }

    /// Signs the transaction with `keypair`, whose address must equal the
    /// sender address.
    pub fn sign(&mut self, keypair: &Keypair) -> Result<(), TxError> {
        if keypair.address() != self.address_from {
            return Err(TxError::WrongSigner);
        }
        self.signature = Some(keypair.sign(&self.hash()));
        Ok(())
    }

    /// Returns `true` if the transaction is well-formed and its signature
    /// authenticates over [`CoinTransaction::hash`].
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
    /// block-binding tag.
    pub fn integrity(&self) -> Result<Hash256, TxError> {
        let signature = self.signature.ok_or(TxError::Unsigned)?;
        let mut preimage = Vec::with_capacity(96);
        preimage.extend_from_slice(self.hash().as_bytes());
        preimage.extend_from_slice(signature.as_bytes());
        Ok(Hash256::compute(&preimage))
    }

    pub fn id(&self) -> &Hash256 {
        &self.id
    }

    pub fn address_from(&self) -> &Address {
        &self.address_from
    }

    pub fn address_to(&self) -> &Address {
        &self.address_to
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::ADDRESS_LEN;

    pub(crate) fn test_keypair(seed: u8) -> Keypair {
        let mut bytes = [0u8; 32];
        bytes[31] = seed;
        bytes[0] = 1;
        Keypair::from_bytes(&bytes).expect("fixed scalar should be valid")
    }

    /// A signed transfer between two deterministic test keypairs.
    pub(crate) fn signed_transfer(from_seed: u8, to_seed: u8, amount: u64) -> CoinTransaction {
        let sender = test_keypair(from_seed);
        let receiver = test_keypair(to_seed);
        let mut tx = CoinTransaction::new(sender.address(), receiver.address(), amount)
            .expect("test transfer should be valid");
        tx.sign(&sender).expect("sender key should sign");
        tx
    }

    #[test]
    fn new_rejects_zero_amount() {
        let sender = test_keypair(1);
        let receiver = test_keypair(2);
        assert_eq!(
            CoinTransaction::new(sender.address(), receiver.address(), 0),
            Err(TxError::BadAmount)
        );
    }

    #[test]
    fn new_rejects_self_transfer() {
        let sender = test_keypair(1);
        assert_eq!(
            CoinTransaction::new(sender.address(), sender.address(), 10),
            Err(TxError::SelfTransfer)
        );
    }

    #[test]
    fn sign_rejects_wrong_signer() {
        let sender = test_keypair(1);
        let receiver = test_keypair(2);
        let mut tx = CoinTransaction::new(sender.address(), receiver.address(), 10).unwrap();

        assert_eq!(tx.sign(&receiver), Err(TxError::WrongSigner));
        assert!(!tx.is_signed());
    }

    #[test]
    fn signed_transaction_verifies() {
        let tx = signed_transfer(1, 2, 50);
        assert!(tx.verify());
    }

    #[test]
    fn unsigned_transaction_does_not_verify() {
        let sender = test_keypair(1);
        let receiver = test_keypair(2);
        let tx = CoinTransaction::new(sender.address(), receiver.address(), 50).unwrap();
        assert!(!tx.verify());
    }

    #[test]
    fn tampered_amount_breaks_verification() {
        let mut tx = signed_transfer(1, 2, 50);
        tx.amount = 51;
        assert!(!tx.verify());
    }

    #[test]
    fn integrity_requires_signature() {
        let sender = test_keypair(1);
        let receiver = test_keypair(2);
        let tx = CoinTransaction::new(sender.address(), receiver.address(), 50).unwrap();
        assert_eq!(tx.integrity(), Err(TxError::Unsigned));
    }

    #[test]
    fn wire_roundtrip_preserves_fields() {
        let tx = signed_transfer(1, 2, 50);
        let json = serde_json::to_string(&tx).expect("tx should serialize");
        let back: CoinTransaction = serde_json::from_str(&json).expect("tx should deserialize");

        assert_eq!(back, tx);
        assert!(back.verify());
    }

    #[test]
    fn wire_rejects_negative_amount() {
        let mut value = serde_json::to_value(signed_transfer(1, 2, 50)).unwrap();
        value["amount"] = serde_json::json!(-5);
        assert!(serde_json::from_value::<CoinTransaction>(value).is_err());
    }

    #[test]
    fn wire_fields_are_hex_strings() {
        let tx = signed_transfer(1, 2, 50);
        let value = serde_json::to_value(&tx).unwrap();

        assert_eq!(value["id"].as_str().unwrap().len(), 64);
        assert_eq!(
            value["address_from"].as_str().unwrap().len(),
            ADDRESS_LEN * 2
        );
        assert_eq!(value["amount"].as_u64(), Some(50));
        assert_eq!(value["signature"].as_str().unwrap().len(), 128);
    }
}
