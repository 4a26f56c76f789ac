//! Autotron backend runtime server
//!
//! Serves:
//! - Graph management at /api/graph
//! - Buffer Store at /api/buffer
//! - Authority lease at /api/authority
//! - Frontend transport at /ws
//! - Health check at /healthz

use autotron::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to 0.0.0.0:3004 and data/graphs.db
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
