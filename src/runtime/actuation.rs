//! Device actuation sink and the authority gate in front of it
//!
//! Nodes never talk to devices directly. They ask the [`ActuationGate`],
//! which forwards the command only while this runtime holds the authority
//! lease, runs it in the background, and posts the outcome back to the
//! evaluation loop. A command already in flight when the lease is lost is
//! allowed to complete.

use crate::{
    authority::AuthorityCoordinator,
    config::DeviceConfig,
    error::ActuationError,
    node::InstanceId,
    runtime::driver::EngineRequest,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::{future::Future, pin::Pin, sync::Arc, time::Duration};
use tokio::sync::mpsc::UnboundedSender;

pub type ActuationFuture = Pin<Box<dyn Future<Output = Result<Value, ActuationError>> + Send>>;

/// Vendor adapter boundary: executes one command against one device
pub trait DeviceSink: Send + Sync {
    fn actuate(&self, device_id: &str, command: &Value) -> ActuationFuture;
}

/// Whether a command left the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Dispatched,
    Gated,
}

/// Completed device command, delivered to the originating node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActuationOutcome {
    pub device_id: String,
    pub command: Value,
    #[serde(serialize_with = "serialize_result")]
    pub result: Result<Value, ActuationError>,
}

impl ActuationOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Socket-friendly form: `{device_id, success, response | error}`
    pub fn to_value(&self) -> Value {
        match &self.result {
            Ok(response) => json!({
                "device_id": self.device_id,
                "success": true,
                "response": response,
            }),
            Err(e) => json!({
                "device_id": self.device_id,
                "success": false,
                "error": e.to_string(),
            }),
        }
    }
}

fn serialize_result<S: serde::Serializer>(
    result: &Result<Value, ActuationError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match result {
        Ok(value) => json!({ "ok": value }).serialize(serializer),
        Err(e) => json!({ "error": e.to_string() }).serialize(serializer),
    }
}

/// Forwards commands to the sink only while this runtime holds the lease
#[derive(Clone)]
pub struct ActuationGate {
    coordinator: Arc<AuthorityCoordinator>,
    sink: Arc<dyn DeviceSink>,
    requests: UnboundedSender<EngineRequest>,
}

impl ActuationGate {
    pub fn new(
        coordinator: Arc<AuthorityCoordinator>,
        sink: Arc<dyn DeviceSink>,
        requests: UnboundedSender<EngineRequest>,
    ) -> Self {
        Self {
            coordinator,
            sink,
            requests,
        }
    }

    /// Fire-and-forget dispatch; the outcome is re-injected as an engine request
    pub fn dispatch(
        &self,
        instance: InstanceId,
        node_id: &str,
        device_id: &str,
        command: Value,
    ) -> Dispatch {
        if !self.coordinator.may_actuate() {
            tracing::debug!(
                "🚧 Gated actuation from '{}' to '{}' ({} holds the lease)",
                node_id,
                device_id,
                self.coordinator.holder()
            );
            return Dispatch::Gated;
        }

        tracing::info!("⚡ Actuating '{}' from node '{}': {}", device_id, node_id, command);

        let pending = self.sink.actuate(device_id, &command);
        let requests = self.requests.clone();
        let device_id = device_id.to_string();
        let node_id = node_id.to_string();

        tokio::spawn(async move {
            let result = pending.await;
            if let Err(e) = &result {
                tracing::warn!(
                    "⚠️ Actuation of '{}' from node '{}' failed: {}",
                    device_id,
                    node_id,
                    e
                );
            }
            let outcome = ActuationOutcome {
                device_id,
                command,
                result,
            };
            // The loop may be gone on shutdown
            let _ = requests.send(EngineRequest::ActuationCompleted { instance, outcome });
        });

        Dispatch::Dispatched
    }
}

/// Posts commands to a device adapter service over HTTP
///
/// `POST {base_url}/devices/{device_id}/command` with body `{"command": ...}`.
#[derive(Debug, Clone)]
pub struct HttpDeviceSink {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpDeviceSink {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

impl DeviceSink for HttpDeviceSink {
    fn actuate(&self, device_id: &str, command: &Value) -> ActuationFuture {
        let url = format!("{}/devices/{}/command", self.base_url, device_id);
        let request = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&json!({ "command": command }));

        Box::pin(async move {
            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    ActuationError::Timeout
                } else {
                    ActuationError::Device(format!("Request to {} failed: {}", url, e))
                }
            })?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| {
                    ActuationError::Device(format!("Failed to read response body: {}", e))
                })?;

            if !status.is_success() {
                return Err(ActuationError::Device(format!(
                    "{} returned {}: {}",
                    url, status, body
                )));
            }

            Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
        })
    }
}

/// Logs commands without contacting any device
#[derive(Debug, Clone, Default)]
pub struct LoggingDeviceSink;

impl DeviceSink for LoggingDeviceSink {
    fn actuate(&self, device_id: &str, command: &Value) -> ActuationFuture {
        tracing::info!("📝 [dry-run] {} <- {}", device_id, command);
        Box::pin(async { Ok(json!({ "dry_run": true })) })
    }
}

/// Sink configured by [`DeviceConfig`]
pub fn sink_from_config(config: &DeviceConfig) -> Arc<dyn DeviceSink> {
    match &config.actuation_url {
        Some(url) => {
            tracing::info!("🔌 Device actuation via {}", url);
            Arc::new(HttpDeviceSink::new(url, config.timeout()))
        }
        None => {
            tracing::warn!("⚠️ No actuation URL configured, device commands are only logged");
            Arc::new(LoggingDeviceSink)
        }
    }
}
