//! Consensus layer: the canonical chain, the block validator, and the
//! block producer.
//!
//! The validator and producer are two sides of the same state-transition
//! rules; the producer builds what the validator accepts, and every locally
//! produced block is passed back through the validator before it is
//! appended or broadcast.

pub mod chain;
pub mod error;
pub mod producer;
pub mod validator;

pub use chain::{Chain, GenesisError};
pub use error::{ProduceError, ValidationError};
pub use producer::BlockProducer;
pub use validator::BlockValidator;
