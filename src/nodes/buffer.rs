//! Nodes reading and writing the Buffer Store.

use crate::{
    guard::SettlingWindow,
    node::{outputs, EvalContext, Inputs, Node, RestoreContext, SocketValues},
};
use anyhow::Result;
use serde_json::{json, Value};

fn key_property(properties: &Value, node_id: &str) -> Result<String> {
    properties
        .get("key")
        .and_then(Value::as_str)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Node '{}' missing 'key' property", node_id))
}

/// Reads buffer key `key` onto `value` (null until first written)
#[derive(Debug, Default)]
pub struct BufferGet {
    key: String,
}

impl Node for BufferGet {
    fn restore(&mut self, properties: &Value, ctx: &RestoreContext<'_>) -> Result<()> {
        self.key = key_property(properties, ctx.node_id)?;
        Ok(())
    }

    fn evaluate(&mut self, _inputs: &Inputs, ctx: &mut EvalContext<'_>) -> Result<SocketValues> {
        let value = ctx.buffer().get(&self.key).unwrap_or(Value::Null);
        Ok(outputs([("value", value)]))
    }

    fn serialize(&self) -> Value {
        json!({ "key": self.key })
    }
}

/// Writes input `value` to buffer key `key` when it changes
///
/// While the settling window is open the node only fills in a missing key.
/// A value replayed by loading the graph never overrides state the store
/// already holds.
#[derive(Debug, Default)]
pub struct BufferSet {
    key: String,
    last_seen: Option<Value>,
    settling: Option<SettlingWindow>,
}

impl Node for BufferSet {
    fn restore(&mut self, properties: &Value, ctx: &RestoreContext<'_>) -> Result<()> {
        self.key = key_property(properties, ctx.node_id)?;
        self.settling = Some(SettlingWindow::new(ctx.now, ctx.settling_window));
        Ok(())
    }

    fn evaluate(&mut self, inputs: &Inputs, ctx: &mut EvalContext<'_>) -> Result<SocketValues> {
        if let Some(value) = inputs.get("value") {
            if self.last_seen.as_ref() != Some(value) {
                let settled = match self.settling {
                    Some(window) => window.is_settled(ctx.now),
                    None => true,
                };
                if settled || ctx.buffer().get(&self.key).is_none() {
                    ctx.buffer().set(&self.key, value.clone());
                } else {
                    tracing::debug!(
                        "🔇 '{}' keeps buffer '{}' while settling",
                        ctx.node_id,
                        self.key
                    );
                }
                self.last_seen = Some(value.clone());
            }
        }
        Ok(outputs([(
            "value",
            self.last_seen.clone().unwrap_or(Value::Null),
        )]))
    }

    fn serialize(&self) -> Value {
        json!({ "key": self.key })
    }
}
