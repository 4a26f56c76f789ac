//! Shared fixtures for integration tests.
#![allow(dead_code)]

use autotron::{
    graph::{CompiledGraph, Edge, Graph, GraphNode, Socket, SocketType},
    node::NodeCatalog,
    role::RuntimeRole,
    runtime::{
        actuation::{ActuationFuture, DeviceSink},
        RuntimeInstance, RuntimeOptions,
    },
    transport::memory_link,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;

/// Device sink that records every command it receives
#[derive(Default)]
pub struct RecordingSink {
    commands: Mutex<Vec<(String, Value)>>,
}

impl RecordingSink {
    pub fn commands(&self) -> Vec<(String, Value)> {
        self.commands.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.commands.lock().len()
    }
}

impl DeviceSink for RecordingSink {
    fn actuate(&self, device_id: &str, command: &Value) -> ActuationFuture {
        self.commands.lock().push((device_id.to_string(), command.clone()));
        Box::pin(async { Ok(json!({ "state": "done" })) })
    }
}

pub fn options(role: RuntimeRole) -> RuntimeOptions {
    RuntimeOptions {
        role,
        tick_interval: Duration::from_secs(1),
        settling_window: Duration::from_secs(3),
        debounce: Duration::from_millis(250),
        heartbeat_interval: Duration::from_secs(30),
        grace_period: Duration::from_secs(75),
        watchdog_interval: Duration::from_secs(1),
    }
}

pub fn start(role: RuntimeRole) -> (RuntimeInstance, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let runtime = RuntimeInstance::start(
        options(role),
        Arc::new(NodeCatalog::builtin()),
        sink.clone(),
        None,
    )
    .expect("runtime starts");
    (runtime, sink)
}

pub fn node(
    id: &str,
    node_type: &str,
    inputs: &[&str],
    outputs: &[&str],
    properties: Value,
) -> GraphNode {
    GraphNode {
        id: id.to_string(),
        node_type: node_type.to_string(),
        inputs: inputs.iter().map(|k| Socket::new(k, SocketType::Any)).collect(),
        outputs: outputs.iter().map(|k| Socket::new(k, SocketType::Any)).collect(),
        properties,
    }
}

/// Buffer key "switch" drives device "lamp"
pub fn lamp_graph() -> Arc<CompiledGraph> {
    let graph = Graph {
        id: "main".to_string(),
        name: "Lamp follows switch".to_string(),
        version: 1,
        nodes: vec![
            node("switch", "buffer_get", &[], &["value"], json!({ "key": "switch" })),
            node(
                "lamp",
                "device_trigger",
                &["trigger"],
                &["fired", "last_result"],
                json!({ "device_id": "lamp", "on_command": "on" }),
            ),
        ],
        edges: vec![Edge::new("switch", "value", "lamp", "trigger")],
    };
    Arc::new(CompiledGraph::compile(graph, &NodeCatalog::builtin()).expect("lamp graph compiles"))
}

/// Join two runtimes with an in-memory link
pub fn connect(
    backend: &RuntimeInstance,
    frontend: &RuntimeInstance,
) -> (JoinHandle<()>, JoinHandle<()>) {
    let (backend_end, frontend_end) = memory_link(64);
    (backend.connect(backend_end), frontend.connect(frontend_end))
}

pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
