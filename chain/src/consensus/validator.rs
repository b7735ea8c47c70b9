//! Full consensus check of a candidate block against its parent.
//!
//! The validator runs every check a correct node demands before accepting a
//! block: header linkage and hash, per-transaction signatures and validity,
//! state replay, body digests, and the verification of every embedded proof
//! under the block-binding tag re-derived from the candidate's own body.
//! The first failing check rejects the block.

use std::sync::Arc;

use tracing::debug;

use super::error::ValidationError;
use crate::prover::{CircuitRegistry, Prover};
use crate::types::Block;

/// Consensus validity predicate for `(parent, candidate)` pairs.
///
/// Holds the fee parameters the state replay needs and the proving backend
/// the embedded proofs are judged with. Validation is deterministic and
/// side-effect free apart from invoking the verifier. Cloning is cheap and
/// shares the prover and registry.
#[derive(Clone)]
pub struct BlockValidator {
    time_tolerance_ms: u64,
    coin_tx_fee: u64,
    proof_tx_fee: u64,
    prover: Arc<dyn Prover>,
    circuits: Arc<CircuitRegistry>,
}

impl BlockValidator {
    pub fn new(
        time_tolerance_ms: u64,
        coin_tx_fee: u64,
        proof_tx_fee: u64,
        prover: Arc<dyn Prover>,
        circuits: Arc<CircuitRegistry>,
    ) -> Self {
        Self {
            time_tolerance_ms,
            coin_tx_fee,
            proof_tx_fee,
            prover,
            circuits,
        }
    }

    /// Runs the full consensus check. `now_ms` is the receiving node's
    /// wall clock, bounding how far into the future a timestamp may lie.
    pub fn validate(
        &self,
        parent: &Block,
        candidate: &Block,
        now_ms: u64,
    ) -> Result<(), ValidationError> {
        self.check_header(parent, candidate, now_ms)?;
        self.check_body(parent, candidate)?;
        Ok(())
    }

    fn check_header(
        &self,
        parent: &Block,
        candidate: &Block,
        now_ms: u64,
    ) -> Result<(), ValidationError> {
        if candidate.serial_id() != parent.serial_id() + 1 {
            return Err(ValidationError::StaleBlock("serial id does not extend parent"));
        }
        if candidate.header().previous_block_hash() != parent.current_block_hash() {
            return Err(ValidationError::StaleBlock("previous hash does not match parent"));
        }
        if candidate.timestamp() < parent.timestamp() {
            return Err(ValidationError::StaleBlock("timestamp precedes parent"));
        }
        if candidate.timestamp() > now_ms + self.time_tolerance_ms {
            return Err(ValidationError::StaleBlock("timestamp too far in the future"));
        }
        if candidate.header().difficulty() < 1 {
            return Err(ValidationError::StaleBlock("difficulty below minimum"));
        }
        if !candidate.header().verify_hash() {
            return Err(ValidationError::HashMismatch("header hash"));
        }
        Ok(())
    }

    fn check_body(&self, parent: &Block, candidate: &Block) -> Result<(), ValidationError> {
        // The binding is re-derived from the candidate's own body; any
        // tampering with block contents shifts it and invalidates every
        // embedded proof.
        let binding = candidate.binding()?;
        let miner = *candidate.header().miner_address();

        let mut state = parent.state_tree().clone();

        for tx in candidate.body().coin_txs() {
            if !tx.verify() {
                return Err(ValidationError::BadSignature);
            }
            tx.check_validity()?;
            state.apply_coin_tx(tx, self.coin_tx_fee, &miner)?;
        }

        for tx in candidate.body().proof_txs() {
            if !tx.verify() {
                return Err(ValidationError::BadSignature);
            }
            tx.check_validity()?;
            let circuit_dir = self
                .circuits
                .circuit_dir(tx.circuit_hash())
                .ok_or(ValidationError::UnknownCircuit(*tx.circuit_hash()))?;
            state.apply_proof_tx(tx, self.proof_tx_fee, &miner)?;

            if !tx.validate(self.prover.as_ref(), circuit_dir, &binding)? {
                debug!("proof tx {} failed verification", tx.id().to_hex());
                return Err(ValidationError::ProofRejected);
            }
        }

        if state.hash() != *candidate.header().state_root_hash() {
            return Err(ValidationError::HashMismatch("state root"));
        }
        if candidate.body().hash_coin_txs() != *candidate.header().coin_txs_hash() {
            return Err(ValidationError::HashMismatch("coin txs"));
        }
        if candidate.body().hash_proof_txs() != *candidate.header().proof_txs_hash() {
            return Err(ValidationError::HashMismatch("proof txs"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::consensus::chain::tests::test_genesis;
    use crate::consensus::producer::BlockProducer;
    use crate::prover::MockProver;
    use crate::types::block::tests::finalised_block;
    use crate::types::coin_tx::tests::test_keypair;
    use crate::types::{
        BlockBody, BlockHeader, CoinTransaction, Hash256, ProofTransaction, StateTree,
    };

    const TOLERANCE_MS: u64 = 10_000;
    const COIN_FEE: u64 = 1;
    const PROOF_FEE: u64 = 2;

    fn test_circuit_hash() -> Hash256 {
        Hash256::compute(b"square circuit source")
    }

    fn test_registry() -> Arc<CircuitRegistry> {
        let mut registry = CircuitRegistry::new();
        registry.insert(test_circuit_hash(), PathBuf::from("circuit/square"));
        Arc::new(registry)
    }

    fn validator_with(prover: MockProver) -> BlockValidator {
        BlockValidator::new(
            TOLERANCE_MS,
            COIN_FEE,
            PROOF_FEE,
            Arc::new(prover),
            test_registry(),
        )
    }

    fn producer_with(prover: MockProver) -> BlockProducer {
        BlockProducer::new(
            COIN_FEE,
            PROOF_FEE,
            1,
            Arc::new(prover),
            test_registry(),
        )
    }

    /// Genesis funding the seed-1 keypair, so test transfers have balance.
    fn funded_genesis() -> crate::types::Block {
        let mut state = StateTree::new();
        state.set(test_keypair(1).address(), 1_000);
        let body = BlockBody::new(Vec::new(), Vec::new(), state);
        finalised_block(
            0,
            1_714_436_126_662,
            Hash256::genesis_previous(),
            body,
            test_keypair(9).address(),
        )
    }

    fn signed_transfer_between(from: u8, to: u8, amount: u64) -> CoinTransaction {
        let sender = test_keypair(from);
        let mut tx =
            CoinTransaction::new(sender.address(), test_keypair(to).address(), amount).unwrap();
        tx.sign(&sender).unwrap();
        tx
    }

    fn signed_request_from(seed: u8, complexity: u64) -> ProofTransaction {
        let requester = test_keypair(seed);
        let mut tx = ProofTransaction::new(
            requester.address(),
            test_circuit_hash(),
            "2 2 4".to_string(),
            complexity,
        )
        .unwrap();
        tx.sign(&requester).unwrap();
        tx
    }

    fn produce_child(
        parent: &crate::types::Block,
        coin_txs: Vec<CoinTransaction>,
        proof_txs: Vec<ProofTransaction>,
    ) -> crate::types::Block {
        producer_with(MockProver::accepting())
            .build_block(
                parent,
                coin_txs,
                proof_txs,
                test_keypair(9).address(),
                parent.timestamp() + 1,
            )
            .expect("test block should build")
    }

    #[test]
    fn accepts_valid_block_with_both_tx_kinds() {
        let genesis = funded_genesis();
        let block = produce_child(
            &genesis,
            vec![signed_transfer_between(1, 2, 50)],
            vec![signed_request_from(1, 3)],
        );

        let validator = validator_with(MockProver::accepting());
        validator
            .validate(&genesis, &block, block.timestamp())
            .expect("block should validate");
    }

    #[test]
    fn rejects_wrong_serial_id() {
        let genesis = funded_genesis();
        let skipped = finalised_block(
            2,
            genesis.timestamp() + 1,
            *genesis.current_block_hash(),
            BlockBody::new(Vec::new(), Vec::new(), genesis.state_tree().clone()),
            test_keypair(9).address(),
        );

        let err = validator_with(MockProver::accepting())
            .validate(&genesis, &skipped, skipped.timestamp())
            .unwrap_err();
        assert!(matches!(err, ValidationError::StaleBlock(_)));
    }

    #[test]
    fn rejects_wrong_parent_hash() {
        let genesis = funded_genesis();
        let foreign = finalised_block(
            1,
            genesis.timestamp() + 1,
            Hash256::compute(b"some other parent"),
            BlockBody::new(Vec::new(), Vec::new(), genesis.state_tree().clone()),
            test_keypair(9).address(),
        );

        let err = validator_with(MockProver::accepting())
            .validate(&genesis, &foreign, foreign.timestamp())
            .unwrap_err();
        assert!(matches!(err, ValidationError::StaleBlock(_)));
    }

    #[test]
    fn rejects_timestamp_before_parent() {
        let genesis = funded_genesis();
        let early = finalised_block(
            1,
            genesis.timestamp() - 1,
            *genesis.current_block_hash(),
            BlockBody::new(Vec::new(), Vec::new(), genesis.state_tree().clone()),
            test_keypair(9).address(),
        );

        let err = validator_with(MockProver::accepting())
            .validate(&genesis, &early, genesis.timestamp() + 5)
            .unwrap_err();
        assert!(matches!(err, ValidationError::StaleBlock(_)));
    }

    #[test]
    fn rejects_timestamp_beyond_tolerance() {
        let genesis = funded_genesis();
        let now = genesis.timestamp() + 100;
        let future = finalised_block(
            1,
            now + TOLERANCE_MS + 1,
            *genesis.current_block_hash(),
            BlockBody::new(Vec::new(), Vec::new(), genesis.state_tree().clone()),
            test_keypair(9).address(),
        );

        let err = validator_with(MockProver::accepting())
            .validate(&genesis, &future, now)
            .unwrap_err();
        assert!(matches!(err, ValidationError::StaleBlock(_)));
    }

    #[test]
    fn rejects_tampered_state_snapshot() {
        let genesis = funded_genesis();
        let block = produce_child(&genesis, vec![signed_transfer_between(1, 2, 50)], Vec::new());

        // Rebuild the block with a self-serving state snapshot; the header
        // hashes still describe the honest body, so the replay must differ.
        let mut forged_state = block.state_tree().clone();
        forged_state.set(test_keypair(2).address(), 1_000_000);
        let forged = crate::types::Block::new(
            block.header().clone(),
            BlockBody::new(
                block.body().coin_txs().to_vec(),
                block.body().proof_txs().to_vec(),
                forged_state,
            ),
        );

        let err = validator_with(MockProver::accepting())
            .validate(&genesis, &forged, forged.timestamp())
            .unwrap_err();
        assert!(matches!(err, ValidationError::HashMismatch(_)));
    }

    #[test]
    fn rejects_overspending_transfer() {
        let genesis = funded_genesis();
        // Balance is 1 000; amount + fee exceeds it.
        let tx = signed_transfer_between(1, 2, 1_000);
        let state = genesis.state_tree().clone();
        let body = BlockBody::new(vec![tx], Vec::new(), state);
        let block = finalised_block(
            1,
            genesis.timestamp() + 1,
            *genesis.current_block_hash(),
            body,
            test_keypair(9).address(),
        );

        let err = validator_with(MockProver::accepting())
            .validate(&genesis, &block, block.timestamp())
            .unwrap_err();
        assert!(matches!(err, ValidationError::Balance(_)));
    }

    #[test]
    fn rejects_unknown_circuit() {
        let genesis = funded_genesis();
        let requester = test_keypair(1);
        let mut tx = ProofTransaction::new(
            requester.address(),
            Hash256::compute(b"circuit nobody has"),
            "1 1 1".to_string(),
            3,
        )
        .unwrap();
        tx.sign(&requester).unwrap();

        let body = BlockBody::new(Vec::new(), vec![tx], genesis.state_tree().clone());
        let block = finalised_block(
            1,
            genesis.timestamp() + 1,
            *genesis.current_block_hash(),
            body,
            test_keypair(9).address(),
        );

        let err = validator_with(MockProver::accepting())
            .validate(&genesis, &block, block.timestamp())
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownCircuit(_)));
    }

    #[test]
    fn rejects_proof_bound_to_other_contents() {
        let genesis = funded_genesis();
        let honest = produce_child(&genesis, Vec::new(), vec![signed_request_from(1, 3)]);

        // Splice an extra coin transfer into the body and refresh the
        // header so everything except the proof binding is consistent.
        let mut state = genesis.state_tree().clone();
        let extra = signed_transfer_between(1, 2, 10);
        state
            .apply_coin_tx(&extra, COIN_FEE, &test_keypair(9).address())
            .unwrap();
        state
            .apply_proof_tx(
                &honest.body().proof_txs()[0],
                PROOF_FEE,
                &test_keypair(9).address(),
            )
            .unwrap();

        let body = BlockBody::new(
            vec![extra],
            honest.body().proof_txs().to_vec(),
            state,
        );
        let header = BlockHeader::new(
            1,
            honest.timestamp(),
            1,
            *genesis.current_block_hash(),
            body.hash_coin_txs(),
            body.hash_proof_txs(),
            body.hash_state_tree(),
            test_keypair(9).address(),
        );
        let tampered = crate::types::Block::new(header, body);

        let err = validator_with(MockProver::accepting())
            .validate(&genesis, &tampered, tampered.timestamp())
            .unwrap_err();
        assert!(matches!(err, ValidationError::ProofRejected));
    }

    #[test]
    fn rejects_when_verifier_says_no() {
        let genesis = funded_genesis();
        let block = produce_child(&genesis, Vec::new(), vec![signed_request_from(1, 3)]);

        let err = validator_with(MockProver::rejecting())
            .validate(&genesis, &block, block.timestamp())
            .unwrap_err();
        assert!(matches!(err, ValidationError::ProofRejected));
    }

    #[test]
    fn replay_conserves_total_balance() {
        let genesis = funded_genesis();
        let block = produce_child(
            &genesis,
            vec![signed_transfer_between(1, 2, 50)],
            vec![signed_request_from(1, 4)],
        );

        validator_with(MockProver::accepting())
            .validate(&genesis, &block, block.timestamp())
            .unwrap();
        assert_eq!(
            genesis.state_tree().total(),
            block.state_tree().total(),
            "coin and proof fees only move balances, never create them"
        );
    }

    #[test]
    fn plain_genesis_child_without_txs_validates() {
        let genesis = test_genesis();
        let block = produce_child(&genesis, Vec::new(), Vec::new());

        validator_with(MockProver::accepting())
            .validate(&genesis, &block, block.timestamp())
            .expect("empty block should validate");
        assert_eq!(block.serial_id(), 1);
        assert_eq!(block.state_tree(), genesis.state_tree());
    }
}
