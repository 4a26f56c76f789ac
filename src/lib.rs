//! Autotron: dual-authority dataflow runtime for home automation graphs
//!
//! The same node graph is evaluated by a browser-embedded frontend runtime
//! and an unattended backend runtime. Only the holder of the authority lease
//! may actuate devices; a small replicated Buffer Store keeps shared scalar
//! state consistent between the two.

// Core configuration and setup
pub mod config;

// Typed error taxonomy
pub mod error;

// Which runtime a value or lease belongs to
pub mod role;

// Graph Store - definitions, persistence and hot-reload registry
pub mod graph;

// Node Contract and built-in node types
pub mod node;
pub mod nodes;

// Edge/Timer Guard Library
pub mod guard;

// Replicated scalar state
pub mod buffer;

// Authority lease, coordinator and frontend session
pub mod authority;

// Evaluation engine, loop, timers and actuation gate
pub mod runtime;

// Transport between the two runtimes
pub mod transport;

// HTTP API layer
pub mod api;

// Server setup and initialization
pub mod server;

pub use authority::{AuthorityCoordinator, FrontendSession, SignalKind};
pub use buffer::{BufferDelta, BufferStore};
pub use graph::{CompiledGraph, Edge, Graph, GraphNode, GraphRegistry};
pub use node::{Node, NodeCatalog};
pub use role::RuntimeRole;
pub use runtime::{RuntimeInstance, RuntimeOptions};
pub use server::start_server;
