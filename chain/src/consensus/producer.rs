//! Block assembly from operator-selected transactions.
//!
//! The producer takes the current tip and the selected coin and proof
//! transactions, replays them on a clone of the tip's state, derives the
//! block-binding tag, proves every included request against it, and
//! finalises body and header. It performs no validation or persistence;
//! callers pass the result through the consensus validator before the block
//! is appended or broadcast.

use std::sync::Arc;

use tracing::debug;

use super::error::ProduceError;
use crate::prover::{CircuitRegistry, Prover};
use crate::types::block::BindingTag;
use crate::types::{Address, Block, BlockBody, BlockHeader, CoinTransaction, ProofTransaction};

/// Assembles candidate blocks on top of a given parent. Cloning is cheap
/// and shares the prover and registry.
#[derive(Clone)]
pub struct BlockProducer {
    coin_tx_fee: u64,
    proof_tx_fee: u64,
    difficulty: u64,
    prover: Arc<dyn Prover>,
    circuits: Arc<CircuitRegistry>,
}

impl BlockProducer {
    pub fn new(
        coin_tx_fee: u64,
        proof_tx_fee: u64,
        difficulty: u64,
        prover: Arc<dyn Prover>,
        circuits: Arc<CircuitRegistry>,
    ) -> Self {
        Self {
            coin_tx_fee,
            proof_tx_fee,
            difficulty,
            prover,
            circuits,
        }
    }

    /// Builds a finalised block over the selected transactions.
    ///
    /// Any failure — a balance underflow, an unknown circuit, a prover
    /// error — aborts the whole draft and leaves the parent state and the
    /// mempool untouched. Prover invocations here are the dominant latency;
    /// callers must not hold the chain lock across this method.
    pub fn build_block(
        &self,
        parent: &Block,
        coin_txs: Vec<CoinTransaction>,
        mut proof_txs: Vec<ProofTransaction>,
        miner: Address,
        timestamp: u64,
    ) -> Result<Block, ProduceError> {
        let mut state = parent.state_tree().clone();

        for tx in &coin_txs {
            state.apply_coin_tx(tx, self.coin_tx_fee, &miner)?;
        }
        for tx in &proof_txs {
            state.apply_proof_tx(tx, self.proof_tx_fee, &miner)?;
        }

        // The binding covers the post-state and every selected transaction;
        // integrity digests ignore the proof field, so attaching proofs
        // below does not shift it.
        let binding = BindingTag::derive(&state.hash(), &coin_txs, &proof_txs)?;

        for tx in proof_txs.iter_mut() {
            let circuit_dir = self
                .circuits
                .circuit_dir(tx.circuit_hash())
                .ok_or(ProduceError::UnknownCircuit(*tx.circuit_hash()))?;
            debug!(
                "proving request {} against circuit {}",
                tx.id().to_hex(),
                tx.circuit_hash().to_hex()
            );
            tx.prove(self.prover.as_ref(), circuit_dir, &binding)?;
        }

        let body = BlockBody::new(coin_txs, proof_txs, state);
        let header = BlockHeader::new(
            parent.serial_id() + 1,
            timestamp,
            self.difficulty,
            *parent.current_block_hash(),
            body.hash_coin_txs(),
            body.hash_proof_txs(),
            body.hash_state_tree(),
            miner,
        );

        Ok(Block::new(header, body))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::prover::MockProver;
    use crate::types::block::tests::finalised_block;
    use crate::types::coin_tx::tests::test_keypair;
    use crate::types::{BlockBody, Hash256, StateTree};

    const COIN_FEE: u64 = 1;
    const PROOF_FEE: u64 = 2;

    fn test_circuit_hash() -> Hash256 {
        Hash256::compute(b"square circuit source")
    }

    fn producer(prover: MockProver) -> BlockProducer {
        let mut registry = CircuitRegistry::new();
        registry.insert(test_circuit_hash(), PathBuf::from("circuit/square"));
        BlockProducer::new(COIN_FEE, PROOF_FEE, 1, Arc::new(prover), Arc::new(registry))
    }

    fn funded_genesis() -> Block {
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

    fn transfer(amount: u64) -> CoinTransaction {
        let sender = test_keypair(1);
        let mut tx =
            CoinTransaction::new(sender.address(), test_keypair(2).address(), amount).unwrap();
        tx.sign(&sender).unwrap();
        tx
    }

    fn request(complexity: u64) -> ProofTransaction {
        let requester = test_keypair(1);
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

    #[test]
    fn empty_block_extends_tip_with_unchanged_state() {
        let genesis = funded_genesis();
        let block = producer(MockProver::accepting())
            .build_block(
                &genesis,
                Vec::new(),
                Vec::new(),
                test_keypair(9).address(),
                genesis.timestamp() + 1,
            )
            .unwrap();

        assert_eq!(block.serial_id(), 1);
        assert_eq!(
            block.header().previous_block_hash(),
            genesis.current_block_hash()
        );
        assert_eq!(block.state_tree(), genesis.state_tree());
        assert!(block.header().verify_hash());
    }

    #[test]
    fn transfers_move_amount_fee_and_miner_cut() {
        let genesis = funded_genesis();
        let miner = test_keypair(9).address();
        let block = producer(MockProver::accepting())
            .build_block(
                &genesis,
                vec![transfer(50)],
                Vec::new(),
                miner,
                genesis.timestamp() + 1,
            )
            .unwrap();

        let state = block.state_tree();
        assert_eq!(state.get(&test_keypair(1).address()), 1_000 - 50 - COIN_FEE);
        assert_eq!(state.get(&test_keypair(2).address()), 50);
        assert_eq!(state.get(&miner), COIN_FEE);
    }

    #[test]
    fn proof_request_pays_ceil_price() {
        let genesis = funded_genesis();
        let miner = test_keypair(9).address();
        // complexity 3, fee denominator 2 -> price 2.
        let block = producer(MockProver::accepting())
            .build_block(
                &genesis,
                Vec::new(),
                vec![request(3)],
                miner,
                genesis.timestamp() + 1,
            )
            .unwrap();

        let state = block.state_tree();
        assert_eq!(state.get(&test_keypair(1).address()), 1_000 - 2);
        assert_eq!(state.get(&miner), 2);
        assert!(block.body().proof_txs()[0].is_proven());
    }

    #[test]
    fn attached_proofs_verify_under_the_block_binding() {
        let genesis = funded_genesis();
        let prover = MockProver::accepting();
        let block = producer(prover)
            .build_block(
                &genesis,
                Vec::new(),
                vec![request(3)],
                test_keypair(9).address(),
                genesis.timestamp() + 1,
            )
            .unwrap();

        let binding = block.binding().unwrap();
        let ok = block.body().proof_txs()[0]
            .validate(&prover, std::path::Path::new("circuit/square"), &binding)
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn overspend_aborts_the_draft() {
        let genesis = funded_genesis();
        let err = producer(MockProver::accepting())
            .build_block(
                &genesis,
                vec![transfer(1_000)], // amount + fee exceeds the balance
                Vec::new(),
                test_keypair(9).address(),
                genesis.timestamp() + 1,
            )
            .unwrap_err();
        assert!(matches!(err, ProduceError::Balance(_)));
    }

    #[test]
    fn unknown_circuit_aborts_the_draft() {
        let genesis = funded_genesis();
        let requester = test_keypair(1);
        let mut tx = ProofTransaction::new(
            requester.address(),
            Hash256::compute(b"unregistered"),
            "1".to_string(),
            3,
        )
        .unwrap();
        tx.sign(&requester).unwrap();

        let err = producer(MockProver::accepting())
            .build_block(
                &genesis,
                Vec::new(),
                vec![tx],
                test_keypair(9).address(),
                genesis.timestamp() + 1,
            )
            .unwrap_err();
        assert!(matches!(err, ProduceError::UnknownCircuit(_)));
    }

    #[test]
    fn prover_failure_aborts_the_draft() {
        let genesis = funded_genesis();
        let err = producer(MockProver::failing())
            .build_block(
                &genesis,
                Vec::new(),
                vec![request(3)],
                test_keypair(9).address(),
                genesis.timestamp() + 1,
            )
            .unwrap_err();
        assert!(matches!(err, ProduceError::Prover(_)));
    }
}
