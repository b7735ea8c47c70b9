//! The canonical chain: an ordered, in-memory list of accepted blocks.

use std::fmt;

use crate::types::{Block, Hash256};

/// Error produced when the configured genesis block is unusable.
///
/// A node cannot run without a valid genesis; callers treat this as fatal.
#[derive(Debug)]
pub enum GenesisError {
    /// Genesis must carry serial id 0.
    WrongSerialId(u64),
    /// Genesis must link to the all-`'0'` placeholder hash.
    WrongPreviousHash,
    /// The stored header hash does not match a recomputation.
    BadHeaderHash,
}

impl fmt::Display for GenesisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenesisError::WrongSerialId(id) => {
                write!(f, "genesis block has serial id {id}, expected 0")
            }
            GenesisError::WrongPreviousHash => {
                write!(f, "genesis block does not link to the placeholder hash")
            }
            GenesisError::BadHeaderHash => {
                write!(f, "genesis header hash does not match its contents")
            }
        }
    }
}

impl std::error::Error for GenesisError {}

/// Ordered list of accepted blocks, genesis first.
///
/// The chain only ever grows by one validated block at a time; the position
/// of a block equals its serial id. Callers run the consensus validator
/// before [`Chain::append`] — linkage violations here are programmer
/// errors and panic rather than propagate.
#[derive(Clone, Debug)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Chain {
    /// Starts a chain from its configured genesis block.
    pub fn new(genesis: Block) -> Result<Self, GenesisError> {
        if genesis.serial_id() != 0 {
            return Err(GenesisError::WrongSerialId(genesis.serial_id()));
        }
        if *genesis.header().previous_block_hash() != Hash256::genesis_previous() {
            return Err(GenesisError::WrongPreviousHash);
        }
        if !genesis.header().verify_hash() {
            return Err(GenesisError::BadHeaderHash);
        }
        Ok(Self {
            blocks: vec![genesis],
        })
    }

    /// The latest accepted block.
    pub fn tip(&self) -> &Block {
        self.blocks.last().expect("chain always holds genesis")
    }

    /// Serial id of the tip.
    pub fn latest_block_id(&self) -> u64 {
        self.tip().serial_id()
    }

    /// Fetches an accepted block by serial id.
    pub fn get(&self, serial_id: u64) -> Option<&Block> {
        let block = self.blocks.get(serial_id as usize)?;
        debug_assert_eq!(block.serial_id(), serial_id, "blocks out of order in chain");
        Some(block)
    }

    /// Appends a block the validator has already accepted.
    ///
    /// # Panics
    ///
    /// Panics if the block does not link to the current tip; that means the
    /// validate-and-append sequence was not serialised correctly.
    pub fn append(&mut self, block: Block) {
        let tip = self.tip();
        assert_eq!(
            block.serial_id(),
            tip.serial_id() + 1,
            "appending out-of-order block"
        );
        assert_eq!(
            block.header().previous_block_hash(),
            tip.current_block_hash(),
            "appending block with wrong parent hash"
        );
        self.blocks.push(block);
    }

    /// Number of accepted blocks, genesis included; always at least 1.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }
}
