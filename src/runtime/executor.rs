//! Fault-containing node invocation
//!
//! The evaluation loop must survive any single node. An `Err` from
//! `evaluate` and a panic inside it are both turned into a [`NodeFault`];
//! the engine then holds that node's previous outputs.

use crate::{
    error::NodeFault,
    node::{EvalContext, Inputs, Node, SocketValues},
};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Runs one node evaluation and contains its failures
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeExecutor;

impl NodeExecutor {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        node: &mut dyn Node,
        inputs: &Inputs,
        ctx: &mut EvalContext<'_>,
    ) -> Result<SocketValues, NodeFault> {
        let node_id = ctx.node_id.to_string();
        // Outputs of a panicked evaluation are discarded
        match catch_unwind(AssertUnwindSafe(|| node.evaluate(inputs, ctx))) {
            Ok(Ok(outputs)) => Ok(outputs),
            Ok(Err(error)) => Err(NodeFault::Failed { node_id, error }),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                Err(NodeFault::Panicked { node_id, message })
            }
        }
    }
}
