//! Single-task evaluation loop
//!
//! Everything that wants a node evaluated (timers, completed actuations,
//! buffer writes, reloads, the periodic tick) sends an [`EngineRequest`]; the
//! loop owns the [`EvaluationEngine`] and handles one request at a time.

use crate::{
    buffer::BufferEvent,
    graph::{CompiledGraph, Graph},
    node::{InstanceId, SocketValues, UpcomingEvent},
    runtime::{actuation::ActuationOutcome, engine::EvaluationEngine, scheduler::TimerTag},
};
use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc::{UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    task::JoinHandle,
};

#[derive(Debug)]
pub enum EngineRequest {
    /// Replace the running graph
    Load(Arc<CompiledGraph>),
    EvaluateAll,
    /// Evaluate one node and what its changes reach
    Reevaluate { node_id: String },
    TimerFired { instance: InstanceId, tag: TimerTag },
    ActuationCompleted { instance: InstanceId, outcome: ActuationOutcome },
    Snapshot(oneshot::Sender<Graph>),
    UpcomingEvents(oneshot::Sender<Vec<UpcomingEvent>>),
    Outputs {
        node_id: String,
        reply: oneshot::Sender<Option<SocketValues>>,
    },
    Shutdown,
}

/// Cloneable sender side of the loop
#[derive(Debug, Clone)]
pub struct EngineHandle {
    requests: UnboundedSender<EngineRequest>,
}

impl EngineHandle {
    pub fn new(requests: UnboundedSender<EngineRequest>) -> Self {
        Self { requests }
    }

    pub fn load(&self, graph: Arc<CompiledGraph>) -> Result<()> {
        self.send(EngineRequest::Load(graph))
    }

    pub fn evaluate_all(&self) -> Result<()> {
        self.send(EngineRequest::EvaluateAll)
    }

    pub async fn snapshot(&self) -> Result<Graph> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Snapshot(reply))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("Evaluation loop dropped snapshot request"))
    }

    pub async fn upcoming_events(&self) -> Result<Vec<UpcomingEvent>> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::UpcomingEvents(reply))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("Evaluation loop dropped upcoming events request"))
    }

    pub async fn outputs(&self, node_id: &str) -> Result<Option<SocketValues>> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Outputs {
            node_id: node_id.to_string(),
            reply,
        })?;
        rx.await
            .map_err(|_| anyhow::anyhow!("Evaluation loop dropped outputs request"))
    }

    pub fn shutdown(&self) {
        let _ = self.requests.send(EngineRequest::Shutdown);
    }

    fn send(&self, request: EngineRequest) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| anyhow::anyhow!("Evaluation loop is not running"))
    }
}

/// Run `engine` until shutdown
///
/// Accepted buffer writes re-evaluate the graph, and so does every tick so
/// time-based guards are observed without new input.
pub fn spawn_loop(
    mut engine: EvaluationEngine,
    mut requests: UnboundedReceiver<EngineRequest>,
    mut buffer_events: broadcast::Receiver<BufferEvent>,
    tick_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + tick_interval,
            tick_interval,
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(EngineRequest::Shutdown) | None => break,
                    Some(request) => engine.handle(request),
                },
                event = buffer_events.recv() => match event {
                    Ok(event) => {
                        tracing::trace!(
                            "🔄 Buffer key '{}' changed, re-evaluating",
                            event.delta.key
                        );
                        engine.evaluate_all();
                    }
                    Err(RecvError::Lagged(_)) => engine.evaluate_all(),
                    Err(RecvError::Closed) => break,
                },
                _ = ticker.tick() => engine.evaluate_all(),
            }
        }

        engine.unload();
        tracing::info!("🛑 Evaluation loop stopped");
    })
}
