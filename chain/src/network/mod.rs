//! Peer protocol: wire messages, TCP framing, the peer table, the gossip
//! engine, and startup synchronisation.

pub mod codec;
pub(crate) mod gossip;
pub mod message;
pub mod peer;
pub(crate) mod sync;

pub use codec::WireError;
pub use message::{Command, Envelope};
pub use peer::{Peer, PeerTable};
