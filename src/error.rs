//! Typed errors for the failures callers branch on.
//!
//! Everything else flows through `anyhow::Result`.

use thiserror::Error;

/// Graph validation errors raised while compiling a graph for evaluation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Node '{node_id}' has unknown type '{node_type}'")]
    UnknownNodeType { node_id: String, node_type: String },

    #[error("Connection references unknown node: {0}")]
    DanglingConnection(String),

    #[error("Node '{node_id}' has no {direction} socket '{socket}'")]
    UnknownSocket {
        node_id: String,
        socket: String,
        direction: &'static str,
    },

    #[error("Cycle without a temporal node: {}", .0.join(" -> "))]
    CombinationalCycle(Vec<String>),
}

/// A node evaluation fault. Recovered locally by holding the node's outputs.
#[derive(Debug, Error)]
pub enum NodeFault {
    #[error("Node '{node_id}' failed: {error}")]
    Failed {
        node_id: String,
        error: anyhow::Error,
    },

    #[error("Node '{node_id}' panicked: {message}")]
    Panicked { node_id: String, message: String },
}

/// Device actuation errors, surfaced to the originating node on a later tick.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActuationError {
    #[error("Actuation gated: this runtime does not hold the authority lease")]
    Gated,

    #[error("Actuation timed out")]
    Timeout,

    #[error("Device error: {0}")]
    Device(String),
}
