//! Temporal nodes: delay and interval.
//!
//! Both own their timers through handles, so destroying the node cancels
//! them, and both publish their next pending action as an upcoming event.

use crate::{
    guard::{Cycle, CycleSpec},
    node::{outputs, EvalContext, Inputs, Node, RestoreContext, SocketValues},
    runtime::scheduler::{TimerHandle, TimerTag},
};
use anyhow::Result;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;

/// `out` follows `in` after `delay_ms`
///
/// The first value seen after restore is adopted immediately; only changes
/// after that are delayed.
#[derive(Debug, Default)]
pub struct Delay {
    delay: Duration,
    last_input: Option<Value>,
    current: Value,
    pending: Option<(Value, Instant)>,
    timer: Option<TimerHandle>,
}

impl Delay {
    const TAG: TimerTag = "delay";
}

impl Node for Delay {
    fn restore(&mut self, properties: &Value, _ctx: &RestoreContext<'_>) -> Result<()> {
        let delay_ms = properties.get("delay_ms").and_then(Value::as_u64).unwrap_or(1_000);
        self.delay = Duration::from_millis(delay_ms);
        Ok(())
    }

    fn evaluate(&mut self, inputs: &Inputs, ctx: &mut EvalContext<'_>) -> Result<SocketValues> {
        if ctx.timer_fired(Self::TAG) {
            if let Some((value, _)) = self.pending.take() {
                self.current = value;
            }
            self.timer = None;
        }

        let input = inputs.value("in");
        match &self.last_input {
            None => self.current = input.clone(),
            Some(previous) if *previous != input => {
                self.pending = Some((input.clone(), ctx.now + self.delay));
                // Replacing the handle cancels the previous timer
                self.timer = Some(ctx.after(Self::TAG, self.delay));
            }
            Some(_) => {}
        }
        self.last_input = Some(input);

        Ok(outputs([("out", self.current.clone())]))
    }

    fn serialize(&self) -> Value {
        json!({ "delay_ms": self.delay.as_millis() as u64 })
    }

    fn on_destroy(&mut self) {
        self.timer = None;
        self.pending = None;
    }

    fn upcoming(&self) -> Vec<(Instant, String)> {
        self.pending
            .iter()
            .map(|(value, at)| (*at, format!("out -> {}", value)))
            .collect()
    }
}

/// Toggles `pulse` on every tick of its cycle (`every_ms` or `cron`)
#[derive(Debug)]
pub struct Interval {
    cycle: Cycle,
    level: bool,
}

impl Default for Interval {
    fn default() -> Self {
        Self {
            cycle: Cycle::new(CycleSpec::Every { every_ms: 60_000 }),
            level: false,
        }
    }
}

impl Node for Interval {
    fn restore(&mut self, properties: &Value, ctx: &RestoreContext<'_>) -> Result<()> {
        let spec: CycleSpec = serde_json::from_value(properties.clone()).map_err(|e| {
            anyhow::anyhow!(
                "Node '{}' needs 'every_ms' or 'cron' property: {}",
                ctx.node_id,
                e
            )
        })?;
        self.cycle = Cycle::new(spec);
        Ok(())
    }

    fn evaluate(&mut self, _inputs: &Inputs, ctx: &mut EvalContext<'_>) -> Result<SocketValues> {
        if self.cycle.poll(ctx)? {
            self.level = !self.level;
        }
        Ok(outputs([
            ("pulse", json!(self.level)),
            ("ticks", json!(self.cycle.ticks())),
        ]))
    }

    fn serialize(&self) -> Value {
        serde_json::to_value(self.cycle.spec()).unwrap_or_default()
    }

    fn on_destroy(&mut self) {
        self.cycle.cancel();
    }

    fn upcoming(&self) -> Vec<(Instant, String)> {
        self.cycle
            .next_tick()
            .map(|at| (at, "pulse".to_string()))
            .into_iter()
            .collect()
    }
}
