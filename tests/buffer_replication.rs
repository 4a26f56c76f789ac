//! Buffer Store replication between two runtimes

mod common;

use autotron::RuntimeRole;
use common::{advance, connect, start};
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn writes_on_either_side_converge() {
    let (backend, _) = start(RuntimeRole::Backend);
    let (frontend, _) = start(RuntimeRole::Frontend);

    // Written before the link exists, delivered by the initial resync
    backend.buffer().set("mode", json!("away"));
    frontend.buffer().set("dimmer", json!(10));
    let _links = connect(&backend, &frontend);
    advance(100).await;

    for level in [20, 35, 50] {
        frontend.buffer().set("dimmer", json!(level));
        backend.buffer().set("temperature", json!(level as f64 / 2.0));
    }
    backend.buffer().set("mode", json!("home"));
    advance(500).await;

    assert_eq!(backend.buffer().snapshot(), frontend.buffer().snapshot());
    assert_eq!(backend.buffer().get("dimmer"), Some(json!(50)));
    assert_eq!(frontend.buffer().get("temperature"), Some(json!(25.0)));
    assert_eq!(frontend.buffer().get("mode"), Some(json!("home")));
}

#[tokio::test(start_paused = true)]
async fn concurrent_equal_timestamp_writes_resolve_to_backend_by_default() {
    let (backend, _) = start(RuntimeRole::Backend);
    let (frontend, _) = start(RuntimeRole::Frontend);
    let _links = connect(&backend, &frontend);
    advance(100).await;

    backend.buffer().set_at("scene", json!("evening"), 1_000);
    frontend.buffer().set_at("scene", json!("movie"), 1_000);
    advance(500).await;

    assert_eq!(backend.buffer().get("scene"), Some(json!("evening")));
    assert_eq!(frontend.buffer().get("scene"), Some(json!("evening")));
}

#[tokio::test(start_paused = true)]
async fn concurrent_equal_timestamp_writes_resolve_to_lease_holder() {
    let (backend, _) = start(RuntimeRole::Backend);
    let (frontend, _) = start(RuntimeRole::Frontend);
    let _links = connect(&backend, &frontend);
    advance(100).await;

    let _session = frontend.acquire_authority().unwrap();
    advance(100).await;
    assert_eq!(backend.coordinator().holder(), RuntimeRole::Frontend);

    backend.buffer().set_at("scene", json!("evening"), 1_000);
    frontend.buffer().set_at("scene", json!("movie"), 1_000);
    advance(500).await;

    let on_backend = backend.buffer().entry("scene").unwrap();
    let on_frontend = frontend.buffer().entry("scene").unwrap();
    assert_eq!(on_backend, on_frontend);
    assert_eq!(on_backend.value, json!("movie"));
    assert_eq!(on_backend.writer, RuntimeRole::Frontend);
}

#[tokio::test(start_paused = true)]
async fn stale_write_never_overwrites_newer_value() {
    let (backend, _) = start(RuntimeRole::Backend);
    let (frontend, _) = start(RuntimeRole::Frontend);

    backend.buffer().set_at("dimmer", json!(80), 2_000);
    frontend.buffer().set_at("dimmer", json!(5), 1_500);
    let _links = connect(&backend, &frontend);
    advance(500).await;

    assert_eq!(backend.buffer().get("dimmer"), Some(json!(80)));
    assert_eq!(frontend.buffer().get("dimmer"), Some(json!(80)));
}

#[tokio::test(start_paused = true)]
async fn bulk_state_on_both_sides_crosses_a_small_link() {
    let (backend, _) = start(RuntimeRole::Backend);
    let (frontend, _) = start(RuntimeRole::Frontend);
    for i in 0..100 {
        backend.buffer().set(&format!("sensor-{i}"), json!(i));
        frontend.buffer().set(&format!("slider-{i}"), json!(i));
    }
    let _links = connect(&backend, &frontend);
    advance(2_000).await;
    assert_eq!(backend.buffer().len(), 200);
    assert_eq!(frontend.buffer().len(), 200);

    // Heartbeats keep flowing while both sides keep writing
    let _session = frontend.acquire_authority().unwrap();
    for round in 0..300 {
        backend.buffer().set("sensor-0", json!(round));
        frontend.buffer().set("slider-0", json!(round));
        advance(1_000).await;
        assert!(
            !(frontend.coordinator().may_actuate() && backend.coordinator().may_actuate()),
            "both runtimes may actuate in round {round}"
        );
    }
    assert_eq!(backend.coordinator().holder(), RuntimeRole::Frontend);
    assert!(frontend.coordinator().may_actuate());
    assert_eq!(frontend.buffer().get("sensor-0"), Some(json!(299)));
}
