//! Stateless value nodes: constant, logic, compare.

use crate::node::{outputs, EvalContext, Inputs, Node, RestoreContext, SocketValues};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Emits property `value` on `out`
#[derive(Debug, Default)]
pub struct Constant {
    value: Value,
}

impl Node for Constant {
    fn restore(&mut self, properties: &Value, _ctx: &RestoreContext<'_>) -> Result<()> {
        self.value = properties.get("value").cloned().unwrap_or(Value::Null);
        Ok(())
    }

    fn evaluate(&mut self, _inputs: &Inputs, _ctx: &mut EvalContext<'_>) -> Result<SocketValues> {
        Ok(outputs([("out", self.value.clone())]))
    }

    fn serialize(&self) -> Value {
        json!({ "value": self.value })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicOp {
    #[default]
    And,
    Or,
    Xor,
    Not,
}

/// Boolean gate over inputs `a` and `b`
#[derive(Debug, Default)]
pub struct Logic {
    op: LogicOp,
}

impl Node for Logic {
    fn restore(&mut self, properties: &Value, _ctx: &RestoreContext<'_>) -> Result<()> {
        self.op = match properties.get("op") {
            Some(op) => serde_json::from_value(op.clone())
                .map_err(|e| anyhow::anyhow!("Invalid logic op {}: {}", op, e))?,
            None => LogicOp::default(),
        };
        Ok(())
    }

    fn evaluate(&mut self, inputs: &Inputs, _ctx: &mut EvalContext<'_>) -> Result<SocketValues> {
        let (a, b) = (inputs.truthy("a"), inputs.truthy("b"));
        let result = match self.op {
            LogicOp::And => a && b,
            LogicOp::Or => a || b,
            LogicOp::Xor => a ^ b,
            LogicOp::Not => !a,
        };
        Ok(outputs([("result", json!(result))]))
    }

    fn serialize(&self) -> Value {
        json!({ "op": self.op })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    #[default]
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
}

/// Numeric comparison of `a` against `b`, or against property `threshold`
/// when `b` is not connected
#[derive(Debug, Default)]
pub struct Compare {
    op: CompareOp,
    threshold: Option<f64>,
}

impl Node for Compare {
    fn restore(&mut self, properties: &Value, _ctx: &RestoreContext<'_>) -> Result<()> {
        self.op = match properties.get("op") {
            Some(op) => serde_json::from_value(op.clone())
                .map_err(|e| anyhow::anyhow!("Invalid compare op {}: {}", op, e))?,
            None => CompareOp::default(),
        };
        self.threshold = properties.get("threshold").and_then(Value::as_f64);
        Ok(())
    }

    fn evaluate(&mut self, inputs: &Inputs, _ctx: &mut EvalContext<'_>) -> Result<SocketValues> {
        let result = match (inputs.number("a"), inputs.number("b").or(self.threshold)) {
            (Some(a), Some(b)) => match self.op {
                CompareOp::Gt => a > b,
                CompareOp::Gte => a >= b,
                CompareOp::Lt => a < b,
                CompareOp::Lte => a <= b,
                CompareOp::Eq => a == b,
                CompareOp::Neq => a != b,
            },
            // Missing operands never satisfy a comparison
            _ => false,
        };
        Ok(outputs([("result", json!(result))]))
    }

    fn serialize(&self) -> Value {
        let mut properties = json!({ "op": self.op });
        if let Some(threshold) = self.threshold {
            properties["threshold"] = json!(threshold);
        }
        properties
    }
}
