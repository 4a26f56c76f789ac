//! Guarded device actuator
//!
//! Dispatches `on_command` to `device_id` on a rising edge of `trigger` and
//! `off_command` (if any) on a falling edge. Edges pass through the node's
//! [`TriggerGuard`], so a graph load replaying "on" never actuates, and
//! commands only reach the device while this runtime holds the lease.

use crate::{
    guard::{EdgeKind, TriggerGuard},
    node::{outputs, EvalContext, Inputs, Node, RestoreContext, SocketValues},
    runtime::actuation::Dispatch,
};
use anyhow::Result;
use serde_json::{json, Value};

#[derive(Debug, Default)]
pub struct DeviceTrigger {
    device_id: String,
    on_command: Value,
    off_command: Option<Value>,
    guard: Option<TriggerGuard>,
    /// Commands handed to the device sink since restore
    fired: u64,
    last_result: Value,
}

impl DeviceTrigger {
    fn dispatch(&mut self, ctx: &EvalContext<'_>, command: Value) {
        match ctx.actuate(&self.device_id, command) {
            Dispatch::Dispatched => self.fired += 1,
            Dispatch::Gated => {}
        }
    }
}

impl Node for DeviceTrigger {
    fn restore(&mut self, properties: &Value, ctx: &RestoreContext<'_>) -> Result<()> {
        self.device_id = properties
            .get("device_id")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("Node '{}' missing 'device_id' property", ctx.node_id))?
            .to_string();
        self.on_command = properties.get("on_command").cloned().unwrap_or(json!("on"));
        self.off_command = properties.get("off_command").filter(|c| !c.is_null()).cloned();
        self.guard = Some(ctx.trigger_guard());
        Ok(())
    }

    fn evaluate(&mut self, inputs: &Inputs, ctx: &mut EvalContext<'_>) -> Result<SocketValues> {
        if let Some(outcome) = ctx.actuation_outcomes().last() {
            self.last_result = outcome.to_value();
        }

        let guard = self
            .guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Node '{}' evaluated before restore", ctx.node_id))?;
        match guard.check("trigger", &inputs.value("trigger"), ctx.now) {
            Some(EdgeKind::Rising) => self.dispatch(ctx, self.on_command.clone()),
            Some(EdgeKind::Falling) => {
                if let Some(off) = self.off_command.clone() {
                    self.dispatch(ctx, off);
                }
            }
            None => {}
        }

        Ok(outputs([
            ("fired", json!(self.fired)),
            ("last_result", self.last_result.clone()),
        ]))
    }

    fn serialize(&self) -> Value {
        json!({
            "device_id": self.device_id,
            "on_command": self.on_command,
            "off_command": self.off_command,
        })
    }
}
