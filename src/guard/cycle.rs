//! Recurring callbacks owned by a node instance.
//!
//! A cycle never mutates node state from its timer task: the timer enqueues a
//! re-evaluation and the node observes the tick through [`Cycle::poll`] on the
//! evaluation loop. Dropping the cycle cancels the timer.

use crate::{
    node::EvalContext,
    runtime::scheduler::{TimerHandle, TimerTag},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Periodic schedule, as stored in node properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CycleSpec {
    /// Fixed period in milliseconds
    Every { every_ms: u64 },
    /// 6-field cron expression (seconds first)
    Cron { cron: String },
}

#[derive(Debug)]
pub struct Cycle {
    spec: CycleSpec,
    handle: Option<TimerHandle>,
    next: Option<Instant>,
    ticks: u64,
}

impl Cycle {
    pub const TAG: TimerTag = "cycle";

    pub fn new(spec: CycleSpec) -> Self {
        Self {
            spec,
            handle: None,
            next: None,
            ticks: 0,
        }
    }

    /// Arm the timer on first use and report whether it ticked since the
    /// previous evaluation
    pub fn poll(&mut self, ctx: &EvalContext<'_>) -> Result<bool> {
        if self.handle.is_none() {
            self.handle = Some(match &self.spec {
                CycleSpec::Every { every_ms } => {
                    let period = Duration::from_millis((*every_ms).max(1));
                    self.next = Some(ctx.now + period);
                    ctx.every(Self::TAG, period)
                }
                CycleSpec::Cron { cron } => ctx.cron(Self::TAG, cron)?,
            });
        }

        let fired = ctx.timer_fired(Self::TAG);
        if fired {
            self.ticks += 1;
            if let CycleSpec::Every { every_ms } = &self.spec {
                self.next = Some(ctx.now + Duration::from_millis((*every_ms).max(1)));
            }
        }
        Ok(fired)
    }

    /// Next expected tick, known for fixed periods only
    pub fn next_tick(&self) -> Option<Instant> {
        self.handle.as_ref().and(self.next)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn spec(&self) -> &CycleSpec {
        &self.spec
    }

    pub fn cancel(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.cancel();
        }
        self.next = None;
    }
}
