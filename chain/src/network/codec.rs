//! TCP framing for the one-message-per-connection protocol.
//!
//! A sender opens a connection, writes one JSON message, and closes its
//! write half; the receiver reads until EOF and parses. There is no
//! length prefix and no pipelining, so the framing is the connection
//! itself.

use std::fmt;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::message::Envelope;

/// Upper bound on a single message, protecting the reader from a peer that
/// never closes its half of the connection.
const MAX_MESSAGE_BYTES: u64 = 8 * 1024 * 1024;

/// Error produced while reading or writing one wire message.
#[derive(Debug)]
pub enum WireError {
    /// The underlying socket operation failed.
    Io(std::io::Error),
    /// The bytes read do not decode into a known message.
    Malformed(String),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Io(e) => write!(f, "socket failure: {e}"),
            WireError::Malformed(msg) => write!(f, "malformed message: {msg}"),
        }
    }
}

impl std::error::Error for WireError {}

impl From<std::io::Error> for WireError {
    fn from(e: std::io::Error) -> Self {
        WireError::Io(e)
    }
}

/// Reads a single message from an inbound connection: everything until the
/// sender closes its write half, parsed as one JSON envelope.
pub async fn read_envelope(stream: &mut TcpStream) -> Result<Envelope, WireError> {
    let mut data = Vec::new();
    stream
        .take(MAX_MESSAGE_BYTES)
        .read_to_end(&mut data)
        .await?;

    serde_json::from_slice(&data).map_err(|e| WireError::Malformed(e.to_string()))
}

/// Opens a connection to `target`, writes one message, and closes it.
///
/// Outbound sockets live entirely inside this call; the sender never waits
/// for a reply on the same connection.
pub async fn send_envelope(target: SocketAddr, envelope: &Envelope) -> Result<(), WireError> {
    let encoded =
        serde_json::to_vec(envelope).map_err(|e| WireError::Malformed(e.to_string()))?;

    let mut stream = TcpStream::connect(target).await?;
    stream.write_all(&encoded).await?;
    stream.shutdown().await?;
    Ok(())
}
