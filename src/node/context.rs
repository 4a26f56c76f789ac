//! Contexts handed to nodes by the evaluation engine.

use crate::{
    buffer::BufferStore,
    guard::TriggerGuard,
    node::InstanceId,
    runtime::{
        actuation::{ActuationGate, ActuationOutcome, Dispatch},
        scheduler::{TimerHandle, TimerService, TimerTag},
    },
};
use anyhow::Result;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Passed to [`Node::restore`](super::Node::restore)
#[derive(Debug, Clone)]
pub struct RestoreContext<'a> {
    pub node_id: &'a str,
    /// Construction time, start of the settling window
    pub now: Instant,
    pub settling_window: Duration,
    pub debounce: Duration,
}

impl RestoreContext<'_> {
    /// Trigger guard using the runtime's settling and debounce windows
    pub fn trigger_guard(&self) -> TriggerGuard {
        TriggerGuard::new(self.now, self.settling_window, self.debounce)
    }
}

/// Passed to [`Node::evaluate`](super::Node::evaluate)
pub struct EvalContext<'a> {
    pub node_id: &'a str,
    /// Start of the current evaluation pass
    pub now: Instant,
    instance: InstanceId,
    buffer: &'a BufferStore,
    gate: &'a ActuationGate,
    timers: &'a TimerService,
    fired: &'a [TimerTag],
    outcomes: &'a [ActuationOutcome],
}

impl<'a> EvalContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        node_id: &'a str,
        now: Instant,
        instance: InstanceId,
        buffer: &'a BufferStore,
        gate: &'a ActuationGate,
        timers: &'a TimerService,
        fired: &'a [TimerTag],
        outcomes: &'a [ActuationOutcome],
    ) -> Self {
        Self {
            node_id,
            now,
            instance,
            buffer,
            gate,
            timers,
            fired,
            outcomes,
        }
    }

    pub fn buffer(&self) -> &BufferStore {
        self.buffer
    }

    /// Dispatch a device command without waiting for it
    ///
    /// The result arrives through [`actuation_outcomes`](Self::actuation_outcomes)
    /// on a later evaluation. Returns [`Dispatch::Gated`] when this runtime
    /// does not hold the authority lease.
    pub fn actuate(&self, device_id: &str, command: Value) -> Dispatch {
        self.gate
            .dispatch(self.instance, self.node_id, device_id, command)
    }

    /// Results of device commands completed since the last evaluation
    pub fn actuation_outcomes(&self) -> &[ActuationOutcome] {
        self.outcomes
    }

    /// Whether the timer tagged `tag` fired since the last evaluation
    pub fn timer_fired(&self, tag: TimerTag) -> bool {
        self.fired.contains(&tag)
    }

    /// Recurring timer owned by this node instance
    pub fn every(&self, tag: TimerTag, period: Duration) -> TimerHandle {
        self.timers.every(self.instance, tag, period)
    }

    /// One-shot timer owned by this node instance
    pub fn after(&self, tag: TimerTag, delay: Duration) -> TimerHandle {
        self.timers.after(self.instance, tag, delay)
    }

    /// Cron timer (6-field, seconds first) owned by this node instance
    pub fn cron(&self, tag: TimerTag, expression: &str) -> Result<TimerHandle> {
        self.timers.cron(self.instance, tag, expression)
    }
}
