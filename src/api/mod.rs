//! HTTP API Layer
//!
//! Operator surface of the backend runtime:
//! - Graph load/save with hot reload and runtime snapshots
//! - Buffer Store inspection and writes
//! - Authority lease status and signals
//! - WebSocket transport for frontend runtimes

pub mod authority;
pub mod buffer;
pub mod graph;
pub mod socket;

use crate::{graph::GraphRegistry, runtime::RuntimeInstance};
use std::sync::Arc;

/// Shared state of every route
#[derive(Clone)]
pub struct AppState {
    /// Hot-reload registry over graph storage
    pub registry: Arc<GraphRegistry>,
    /// The backend runtime evaluating the installed graph
    pub runtime: Arc<RuntimeInstance>,
}

pub use authority::create_authority_routes;
pub use buffer::create_buffer_routes;
pub use graph::create_graph_routes;
pub use socket::create_socket_routes;
