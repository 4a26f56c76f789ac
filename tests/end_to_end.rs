//! Live editing session against a running backend, end to end

mod common;

use autotron::RuntimeRole;
use common::{advance, connect, lamp_graph, start};
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn editor_session_crash_hands_actuation_back_to_backend() {
    let (backend, backend_sink) = start(RuntimeRole::Backend);
    let (frontend, frontend_sink) = start(RuntimeRole::Frontend);
    backend.load(lamp_graph()).unwrap();
    frontend.load(lamp_graph()).unwrap();
    let _links = connect(&backend, &frontend);

    // Past the settling window on both sides
    advance(4_000).await;

    // Editor opens and borrows the lease
    let session = frontend.acquire_authority().unwrap();
    advance(500).await;
    assert_eq!(backend.coordinator().holder(), RuntimeRole::Frontend);
    assert!(session.coordinator().may_actuate());

    // A switch flip in the editor reaches both runtimes, only the editor actuates
    frontend.buffer().set("switch", json!(true));
    advance(1_000).await;
    assert_eq!(backend.buffer().get("switch"), Some(json!(true)));
    assert_eq!(frontend_sink.commands(), vec![("lamp".to_string(), json!("on"))]);
    assert_eq!(backend_sink.count(), 0);

    // Two heartbeats keep the lease with the editor well past the grace period
    advance(30_000).await;
    advance(30_000).await;
    advance(30_000).await;
    let status = backend.coordinator().status();
    assert_eq!(status.holder, RuntimeRole::Frontend);
    assert!(status.since_heartbeat_ms.unwrap() < 30_000);

    // Editor tab hangs: no more heartbeats, no release, link left open
    drop(session);
    frontend.shutdown().await.unwrap();

    // Still inside the grace period: backend observes but stays gated
    advance(10_000).await;
    backend.buffer().set("switch", json!(false));
    advance(1_000).await;
    backend.buffer().set("switch", json!(true));
    advance(1_000).await;
    assert_eq!(backend.coordinator().holder(), RuntimeRole::Frontend);
    assert_eq!(backend_sink.count(), 0);

    // Grace period runs out
    advance(75_000).await;
    assert_eq!(backend.coordinator().holder(), RuntimeRole::Backend);

    // The next rising edge the backend observes is actuated
    backend.buffer().set("switch", json!(false));
    advance(1_000).await;
    backend.buffer().set("switch", json!(true));
    advance(1_000).await;
    assert_eq!(backend_sink.commands(), vec![("lamp".to_string(), json!("on"))]);
    assert_eq!(frontend_sink.count(), 1);

    backend.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn closing_the_editor_returns_authority_immediately() {
    let (backend, backend_sink) = start(RuntimeRole::Backend);
    let (frontend, _frontend_sink) = start(RuntimeRole::Frontend);
    backend.load(lamp_graph()).unwrap();
    frontend.load(lamp_graph()).unwrap();
    let (backend_link, frontend_link) = connect(&backend, &frontend);

    advance(4_000).await;
    let _session = frontend.acquire_authority().unwrap();
    advance(500).await;
    assert_eq!(backend.coordinator().holder(), RuntimeRole::Frontend);

    // Tab closed: the link goes away without a release signal
    frontend_link.abort();
    advance(500).await;
    assert!(backend_link.is_finished());
    assert_eq!(backend.coordinator().holder(), RuntimeRole::Backend);

    backend.buffer().set("switch", json!(true));
    advance(1_000).await;
    assert_eq!(backend_sink.count(), 1);
}
