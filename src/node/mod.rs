//! Node Contract
//!
//! Every automation unit implements [`Node`]: a transform from input socket
//! values to output socket values, persisted properties, and lifecycle hooks.
//! Nodes are built from the [`NodeCatalog`] by type tag and driven only by the
//! evaluation engine, one call at a time.

pub mod catalog;
pub mod context;

pub use catalog::{NodeCatalog, NodeKind};
pub use context::{EvalContext, RestoreContext};

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::time::Instant;

/// Values keyed by socket key
pub type SocketValues = HashMap<String, Value>;

/// Identity of one node instance. A node rebuilt on reload gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstanceId(pub u64);

/// A typed unit of graph logic
///
/// `evaluate` must be idempotent for unchanged inputs and must never block:
/// device calls go through [`EvalContext::actuate`] and their results come
/// back on a later evaluation.
pub trait Node: Send {
    /// Rebuild observable behavior from persisted properties
    ///
    /// Called once, right after construction. Transient state starts empty.
    fn restore(&mut self, properties: &Value, ctx: &RestoreContext<'_>) -> Result<()>;

    /// Compute output socket values from input socket values
    fn evaluate(&mut self, inputs: &Inputs, ctx: &mut EvalContext<'_>) -> Result<SocketValues>;

    /// Properties that reconstruct this node through `restore`
    fn serialize(&self) -> Value;

    /// Release timers and other resources. The node is dropped right after.
    fn on_destroy(&mut self) {}

    /// Pending timed actions, for display only
    fn upcoming(&self) -> Vec<(Instant, String)> {
        Vec::new()
    }
}

/// One entry of the upcoming-events projection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingEvent {
    pub node_id: String,
    pub time: chrono::DateTime<chrono::Utc>,
    pub label: String,
}

/// Input socket values gathered for one evaluation
///
/// The engine routes raw values, so the accessors coerce defensively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inputs {
    values: SocketValues,
}

impl Inputs {
    pub fn new(values: SocketValues) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Value on `key`, null when unconnected
    pub fn value(&self, key: &str) -> Value {
        self.values.get(key).cloned().unwrap_or(Value::Null)
    }

    pub fn truthy(&self, key: &str) -> bool {
        self.values.get(key).map(crate::guard::is_truthy).unwrap_or(false)
    }

    /// Numeric coercion: numbers, numeric strings and booleans
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_map(&self) -> &SocketValues {
        &self.values
    }
}

/// Build a [`SocketValues`] map from `(key, value)` pairs
pub fn outputs<const N: usize>(pairs: [(&str, Value); N]) -> SocketValues {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inputs_coerce_defensively() {
        let inputs = Inputs::new(outputs([
            ("n", json!("21.5")),
            ("b", json!(true)),
            ("s", json!("on")),
            ("o", json!({ "x": 1 })),
        ]));

        assert_eq!(inputs.number("n"), Some(21.5));
        assert_eq!(inputs.number("b"), Some(1.0));
        assert_eq!(inputs.number("o"), None);
        assert_eq!(inputs.number("missing"), None);
        assert!(inputs.truthy("s"));
        assert!(!inputs.truthy("missing"));
        assert_eq!(inputs.value("missing"), Value::Null);
    }
}
