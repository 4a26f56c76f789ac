//! Type tag -> node constructor registry.

use crate::node::Node;
use std::collections::HashMap;

/// Constructor and scheduling traits of one node type
#[derive(Clone, Copy)]
pub struct NodeKind {
    /// Temporal nodes hold state across time (timers), so a cycle through one
    /// is a legal feedback loop
    pub temporal: bool,
    pub build: fn() -> Box<dyn Node>,
}

impl std::fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeKind")
            .field("temporal", &self.temporal)
            .finish()
    }
}

/// Registry of node types available to graphs
#[derive(Debug, Default, Clone)]
pub struct NodeCatalog {
    kinds: HashMap<String, NodeKind>,
}

impl NodeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every built-in node type registered
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        crate::nodes::register_builtin(&mut catalog);
        catalog
    }

    pub fn register(&mut self, node_type: &str, temporal: bool, build: fn() -> Box<dyn Node>) {
        self.kinds
            .insert(node_type.to_string(), NodeKind { temporal, build });
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.kinds.contains_key(node_type)
    }

    pub fn is_temporal(&self, node_type: &str) -> bool {
        self.kinds
            .get(node_type)
            .map(|kind| kind.temporal)
            .unwrap_or(false)
    }

    pub fn build(&self, node_type: &str) -> Option<Box<dyn Node>> {
        self.kinds.get(node_type).map(|kind| (kind.build)())
    }
}
