//! One complete runtime: buffer, authority, transport, timers and the
//! evaluation loop wired together
//!
//! The backend server and the frontend editor run the same assembly; only
//! the role and the device sink differ.

use crate::{
    authority::{AuthorityCoordinator, FrontendSession},
    buffer::BufferStore,
    config::Config,
    graph::CompiledGraph,
    node::NodeCatalog,
    role::RuntimeRole,
    runtime::{
        actuation::{ActuationGate, DeviceSink},
        driver::{spawn_loop, EngineHandle},
        engine::{EngineServices, EvaluationEngine},
        scheduler::TimerService,
    },
    transport::{attach, LinkEnd, TransportHub},
};
use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_cron_scheduler::JobScheduler;

/// Timing and identity of one runtime
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub role: RuntimeRole,
    pub tick_interval: Duration,
    pub settling_window: Duration,
    pub debounce: Duration,
    pub heartbeat_interval: Duration,
    pub grace_period: Duration,
    pub watchdog_interval: Duration,
}

impl RuntimeOptions {
    pub fn from_config(config: &Config, role: RuntimeRole) -> Self {
        Self {
            role,
            tick_interval: config.runtime.tick_interval(),
            settling_window: config.runtime.settling_window(),
            debounce: config.runtime.debounce(),
            heartbeat_interval: config.authority.heartbeat_interval(),
            grace_period: config.authority.grace_period(),
            watchdog_interval: config.authority.watchdog_interval(),
        }
    }

    /// Reject timings the loop, watchdog or heartbeat cannot run with
    pub fn validate(&self) -> Result<()> {
        for (name, period) in [
            ("tick interval", self.tick_interval),
            ("heartbeat interval", self.heartbeat_interval),
            ("watchdog interval", self.watchdog_interval),
        ] {
            if period.is_zero() {
                return Err(anyhow::anyhow!("The {} must be greater than zero", name));
            }
        }
        if self.grace_period <= self.heartbeat_interval {
            return Err(anyhow::anyhow!(
                "Grace period ({:?}) must exceed the heartbeat interval ({:?})",
                self.grace_period,
                self.heartbeat_interval
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct RuntimeInstance {
    options: RuntimeOptions,
    buffer: Arc<BufferStore>,
    coordinator: Arc<AuthorityCoordinator>,
    hub: Arc<TransportHub>,
    timers: TimerService,
    engine: EngineHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl RuntimeInstance {
    /// Wire a runtime and start its evaluation loop and lease watchdog
    ///
    /// Must be called from within a tokio runtime. The graph starts empty;
    /// call [`load`](Self::load) to run one.
    pub fn start(
        options: RuntimeOptions,
        catalog: Arc<NodeCatalog>,
        sink: Arc<dyn DeviceSink>,
        cron: Option<JobScheduler>,
    ) -> Result<Self> {
        options.validate()?;
        tracing::info!("🚀 Starting {} runtime", options.role);

        let buffer = Arc::new(BufferStore::new(options.role));
        let coordinator = Arc::new(AuthorityCoordinator::new(options.role, options.grace_period));
        let hub = Arc::new(TransportHub::new(Arc::clone(&buffer), Arc::clone(&coordinator)));

        let (requests, receiver) = mpsc::unbounded_channel();
        let mut timers = TimerService::new(requests.clone());
        if let Some(scheduler) = cron {
            timers = timers.with_cron(scheduler);
        }
        let gate = ActuationGate::new(Arc::clone(&coordinator), sink, requests.clone());

        let engine = EvaluationEngine::new(
            catalog,
            EngineServices {
                buffer: Arc::clone(&buffer),
                gate,
                timers: timers.clone(),
                requests: requests.clone(),
            },
            options.settling_window,
            options.debounce,
        );

        let evaluation = spawn_loop(engine, receiver, buffer.subscribe(), options.tick_interval);
        let watchdog = coordinator.spawn_watchdog(options.watchdog_interval);

        Ok(Self {
            options,
            buffer,
            coordinator,
            hub,
            timers,
            engine: EngineHandle::new(requests),
            tasks: vec![evaluation, watchdog],
        })
    }

    pub fn role(&self) -> RuntimeRole {
        self.options.role
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn buffer(&self) -> &Arc<BufferStore> {
        &self.buffer
    }

    pub fn coordinator(&self) -> &Arc<AuthorityCoordinator> {
        &self.coordinator
    }

    pub fn hub(&self) -> &Arc<TransportHub> {
        &self.hub
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Run `graph`, replacing whatever was running
    pub fn load(&self, graph: Arc<CompiledGraph>) -> Result<()> {
        self.engine.load(graph)
    }

    /// Attach a transport link to the other runtime
    pub fn connect(&self, end: LinkEnd) -> JoinHandle<()> {
        attach(Arc::clone(&self.hub), end)
    }

    /// Frontend only: borrow the authority lease from the backend
    pub fn acquire_authority(&self) -> Result<FrontendSession> {
        if self.options.role != RuntimeRole::Frontend {
            return Err(anyhow::anyhow!("Only a frontend runtime can acquire authority"));
        }
        FrontendSession::acquire(Arc::clone(&self.hub), self.options.heartbeat_interval)
    }

    /// Stop the evaluation loop, destroying every node, then background tasks
    pub async fn shutdown(mut self) -> Result<()> {
        self.engine.shutdown();
        let mut tasks = std::mem::take(&mut self.tasks).into_iter();
        if let Some(evaluation) = tasks.next() {
            let _ = evaluation.await;
        }
        for task in tasks {
            task.abort();
        }
        self.timers.shutdown().await?;
        tracing::info!("👋 {} runtime stopped", self.options.role);
        Ok(())
    }
}

impl Drop for RuntimeInstance {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
