//! Graph Store
//!
//! Serialized node/edge definitions, SQLite persistence with whole-graph
//! versioning, and the hot-reload registry that validates and compiles
//! graphs for the evaluation engine.

// Core graph type definitions
pub mod types;

// SQLite persistence layer for graph storage
pub mod storage;

// Validation, compilation and lock-free hot reload
pub mod registry;

pub use registry::{CompiledGraph, GraphRegistry};
pub use storage::GraphStorage;
pub use types::{Edge, Graph, GraphNode, Socket, SocketType};
