//! Edge and timer guards, alone and inside a running graph

mod common;

use autotron::{
    graph::{CompiledGraph, Graph},
    guard::{EdgeDetector, EdgeKind, TriggerGuard},
    NodeCatalog, RuntimeRole,
};
use common::{advance, node, start};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

#[test]
fn rising_edge_fires_once_per_transition() {
    let mut edges = EdgeDetector::new();
    let fired: Vec<usize> = [false, true, true, false, true]
        .iter()
        .enumerate()
        .filter(|(_, level)| edges.rising("trigger", &json!(level)))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(fired, vec![1, 4]);
}

#[test]
fn lines_are_tracked_independently() {
    let mut edges = EdgeDetector::new();
    edges.observe("a", &json!(false));
    edges.observe("b", &json!(true));
    assert_eq!(edges.observe("a", &json!(true)), Some(EdgeKind::Rising));
    assert_eq!(edges.observe("b", &json!(false)), Some(EdgeKind::Falling));
    assert_eq!(edges.level("a"), Some(true));
}

#[test]
fn nothing_fires_before_the_settling_window_closes() {
    let restored = Instant::now();
    let window = Duration::from_secs(3);
    let mut guard = TriggerGuard::new(restored, window, Duration::ZERO);

    let mut fired = Vec::new();
    for (step, level) in [true, false, true, false, true, false].into_iter().enumerate() {
        let at = restored + Duration::from_millis(500 * step as u64);
        if guard.check("in", &json!(level), at).is_some() {
            fired.push(step);
        }
    }
    assert!(fired.is_empty());

    // First transition strictly after the window does fire
    let after = restored + window + Duration::from_millis(1);
    assert_eq!(guard.check("in", &json!(true), after), Some(EdgeKind::Rising));
}

#[tokio::test(start_paused = true)]
async fn interval_ticks_until_the_graph_is_replaced() {
    let (runtime, _) = start(RuntimeRole::Backend);
    let catalog = NodeCatalog::builtin();
    let graph = Graph {
        id: "main".to_string(),
        name: "Heartbeat".to_string(),
        version: 1,
        nodes: vec![node(
            "tick",
            "interval",
            &[],
            &["pulse", "ticks"],
            json!({ "every_ms": 1_000 }),
        )],
        edges: vec![],
    };
    runtime
        .load(Arc::new(CompiledGraph::compile(graph, &catalog).unwrap()))
        .unwrap();

    advance(3_500).await;
    let outputs = runtime.engine().outputs("tick").await.unwrap().unwrap();
    assert_eq!(outputs["ticks"], json!(3));
    assert_eq!(runtime.engine().upcoming_events().await.unwrap().len(), 1);

    // Replacing the graph destroys the node and its timer
    runtime.load(Arc::new(CompiledGraph::empty("main"))).unwrap();
    advance(3_000).await;
    assert!(runtime.engine().outputs("tick").await.unwrap().is_none());
    assert!(runtime.engine().upcoming_events().await.unwrap().is_empty());
}
