//! Configuration management for the Autotron runtime
//!
//! Handles server binding, graph storage location, evaluation loop timing,
//! authority lease timing and the device actuation endpoint.

use crate::{role::RuntimeRole, runtime::RuntimeOptions};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Evaluation loop configuration
    pub runtime: RuntimeConfig,
    /// Authority lease timing
    pub authority: AuthorityConfig,
    /// Device actuation sink
    pub devices: DeviceConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Graph persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding `graphs.db` (default: "data")
    pub data_dir: String,
}

/// Evaluation loop configuration shared by both runtimes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Graph loaded at startup
    pub graph_id: String,
    /// Period of the full re-evaluation tick
    pub tick_interval_ms: u64,
    /// Post-restore window during which edges are recorded but never fire
    pub settling_window_ms: u64,
    /// Trailing window suppressing repeated triggers of the same node
    pub debounce_ms: u64,
}

/// Authority lease timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// How often a frontend holder renews the lease
    pub heartbeat_interval_ms: u64,
    /// Silence after which a frontend lease falls back to the backend
    pub grace_period_ms: u64,
    /// How often the watchdog checks for an expired lease
    pub watchdog_interval_ms: u64,
}

/// Device actuation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Base URL of the device adapter service. `None` logs commands only.
    pub actuation_url: Option<String>,
    /// Per-command timeout
    pub timeout_ms: u64,
}

impl Config {
    /// Check timing before anything is started
    pub fn validate(&self) -> Result<()> {
        RuntimeOptions::from_config(self, RuntimeRole::Backend).validate()?;
        if self.devices.timeout_ms == 0 {
            return Err(anyhow::anyhow!("The actuation timeout must be greater than zero"));
        }
        Ok(())
    }
}

impl RuntimeConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn settling_window(&self) -> Duration {
        Duration::from_millis(self.settling_window_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl AuthorityConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }
}

impl DeviceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            graph_id: std::env::var("AUTOTRON_GRAPH_ID").unwrap_or_else(|_| "main".to_string()),
            tick_interval_ms: env_u64("AUTOTRON_TICK_INTERVAL_MS", 1_000),
            settling_window_ms: env_u64("AUTOTRON_SETTLING_WINDOW_MS", 3_000),
            debounce_ms: env_u64("AUTOTRON_DEBOUNCE_MS", 250),
        }
    }
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: env_u64("AUTOTRON_HEARTBEAT_INTERVAL_MS", 30_000),
            // 2.5x the heartbeat interval
            grace_period_ms: env_u64("AUTOTRON_GRACE_PERIOD_MS", 75_000),
            watchdog_interval_ms: env_u64("AUTOTRON_WATCHDOG_INTERVAL_MS", 1_000),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            actuation_url: std::env::var("AUTOTRON_ACTUATION_URL").ok(),
            timeout_ms: env_u64("AUTOTRON_ACTUATION_TIMEOUT_MS", 5_000),
        }
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("AUTOTRON_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("AUTOTRON_PORT")
                    .unwrap_or_else(|_| "3004".to_string())
                    .parse()
                    .unwrap_or(3004),
            },
            database: DatabaseConfig {
                data_dir: std::env::var("AUTOTRON_DATA_DIR")
                    .unwrap_or_else(|_| "data".to_string()),
            },
            runtime: RuntimeConfig::default(),
            authority: AuthorityConfig::default(),
            devices: DeviceConfig::default(),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
