//! Shared state handed to every route handler.

use std::sync::Arc;

use chain::Node;

/// Application state: the embedded node.
///
/// The node's own locks already serialise access to the chain and the
/// mempools, so the handlers only need a shared reference.
pub struct AppState {
    pub node: Node,
}

pub type SharedState = Arc<AppState>;
