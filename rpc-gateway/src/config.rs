//! Gateway configuration.

use std::net::SocketAddr;

/// Settings for the HTTP side of the gateway.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address the JSON-RPC server binds.
    pub listen_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        // Safe to unwrap: this is a fixed, valid address literal.
        let addr: SocketAddr = "127.0.0.1:9545"
            .parse()
            .expect("hard-coded RPC listen address should parse");
        Self { listen_addr: addr }
    }
}
