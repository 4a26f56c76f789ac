//! Core graph type definitions
//!
//! Defines the serialized shapes the editor saves and both runtimes load:
//! graphs, nodes with typed sockets, and edges between sockets. These types are
//! serialized as one JSON document per graph for persistence.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complete automation graph, loaded and saved as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// Unique graph identifier (e.g., "main")
    pub id: String,
    /// Human-readable graph name
    #[serde(default)]
    pub name: String,
    /// Version assigned by storage, bumped on every save
    #[serde(default)]
    pub version: i64,
    /// Nodes in this graph
    pub nodes: Vec<GraphNode>,
    /// Edges connecting output sockets to input sockets
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// A single node in the graph
///
/// The `properties` bag fully reconstructs observable behavior after reload;
/// runtime-only state (timers, last-seen inputs) is never stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Stable node identifier within the graph (e.g., "porch-light")
    pub id: String,
    /// Type tag resolved through the node catalog (e.g., "device_trigger")
    pub node_type: String,
    /// Ordered input sockets
    #[serde(default)]
    pub inputs: Vec<Socket>,
    /// Ordered output sockets
    #[serde(default)]
    pub outputs: Vec<Socket>,
    /// Node-type-specific persisted configuration
    #[serde(default)]
    pub properties: Value,
}

/// A typed input or output slot on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Socket {
    pub key: String,
    #[serde(default)]
    pub socket_type: SocketType,
}

/// Socket value types. The engine routes raw values and does not enforce them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketType {
    Boolean,
    Number,
    String,
    #[default]
    Any,
}

/// Connection from one node's output socket to another node's input socket
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Source node ID
    pub from: String,
    /// Source output socket key
    pub from_socket: String,
    /// Target node ID
    pub to: String,
    /// Target input socket key
    pub to_socket: String,
}

impl Graph {
    /// An empty graph, used before anything has been saved
    pub fn empty(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
            version: 0,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

impl GraphNode {
    pub fn has_input(&self, key: &str) -> bool {
        self.inputs.iter().any(|socket| socket.key == key)
    }

    pub fn has_output(&self, key: &str) -> bool {
        self.outputs.iter().any(|socket| socket.key == key)
    }
}

impl Socket {
    pub fn new(key: &str, socket_type: SocketType) -> Self {
        Self {
            key: key.to_string(),
            socket_type,
        }
    }
}

impl Edge {
    pub fn new(from: &str, from_socket: &str, to: &str, to_socket: &str) -> Self {
        Self {
            from: from.to_string(),
            from_socket: from_socket.to_string(),
            to: to.to_string(),
            to_socket: to_socket.to_string(),
        }
    }
}
