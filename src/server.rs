//! Server setup and initialization
//!
//! Wires together graph storage, the registry, the backend runtime and the
//! HTTP routes.

use crate::{
    api::{
        create_authority_routes, create_buffer_routes, create_graph_routes, create_socket_routes,
        AppState,
    },
    config::Config,
    graph::{GraphRegistry, GraphStorage},
    node::NodeCatalog,
    role::RuntimeRole,
    runtime::{actuation::sink_from_config, RuntimeInstance, RuntimeOptions},
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_cron_scheduler::JobScheduler;

/// Create the Axum application and the backend runtime behind it
pub async fn create_app(config: Config) -> Result<(Router, Arc<RuntimeInstance>)> {
    tracing::info!("📁 Ensuring data directory exists: {}", config.database.data_dir);
    std::fs::create_dir_all(&config.database.data_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create data directory: {}", e))?;

    tracing::info!("📋 Initializing graph storage");
    let storage = GraphStorage::open(&config.database.data_dir)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open graph storage: {}", e))?;

    tracing::info!("📊 Initializing graph registry");
    let catalog = Arc::new(NodeCatalog::builtin());
    let registry = Arc::new(GraphRegistry::new(
        storage,
        Arc::clone(&catalog),
        &config.runtime.graph_id,
    ));
    let compiled = registry
        .init_from_storage()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load graph from storage: {}", e))?;

    tracing::info!("⏰ Initializing cron scheduler");
    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create cron scheduler: {}", e))?;
    scheduler
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start cron scheduler: {}", e))?;

    let runtime = Arc::new(RuntimeInstance::start(
        RuntimeOptions::from_config(&config, RuntimeRole::Backend),
        catalog,
        sink_from_config(&config.devices),
        Some(scheduler),
    )?);
    runtime.load(compiled)?;

    let state = AppState {
        registry,
        runtime: Arc::clone(&runtime),
    };

    tracing::info!("📡 Creating HTTP router");
    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_graph_routes())
        .merge(create_buffer_routes())
        .merge(create_authority_routes())
        .merge(create_socket_routes())
        .with_state(state);

    tracing::info!("✅ Application initialized successfully");

    Ok((app, runtime))
}

/// Install the tracing subscriber; `RUST_LOG` overrides the default `info`
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .try_init();
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    init_tracing();
    config.validate()?;
    tracing::info!("Starting Autotron server...");

    let (app, runtime) = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Routes are gone, so this is the last handle
    match Arc::try_unwrap(runtime) {
        Ok(runtime) => runtime.shutdown().await?,
        Err(_) => tracing::warn!("⚠️ Runtime still shared at shutdown, skipping graceful stop"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("🛑 Shutdown requested");
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
