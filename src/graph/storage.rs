//! SQLite persistence layer for graph storage
//!
//! Graphs are stored as one JSON document per row and saved atomically. Every
//! save bumps the row's version so both runtimes can tell which revision of
//! the graph they are evaluating.

use crate::graph::types::Graph;
use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::path::Path;

/// SQLite-based graph storage
#[derive(Debug, Clone)]
pub struct GraphStorage {
    /// SQLite connection pool for the graph database
    pool: SqlitePool,
}

/// Basic graph metadata for listing operations
#[derive(Debug, serde::Serialize)]
pub struct GraphMetadata {
    pub id: String,
    pub name: String,
    pub version: i64,
    pub updated_at: String,
}

impl GraphStorage {
    /// Create storage on an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) `graphs.db` in the data directory
    pub async fn open(data_dir: &str) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| anyhow::anyhow!("Failed to create data directory '{}': {}", data_dir, e))?;
        let db_path = Path::new(data_dir).join("graphs.db");

        tracing::info!("🗄️ Opening graph database: {}", db_path.display());

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        let storage = Self::new(pool);
        storage.init_schema().await?;
        Ok(storage)
    }

    /// In-memory storage with a single connection, used by tests
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let storage = Self::new(pool);
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Initialize the graph storage schema
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS graphs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                version INTEGER NOT NULL,
                definition JSON NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Save a graph as a new version
    ///
    /// Reads the current version and writes the incremented one in the same
    /// transaction. Returns the graph as stored, carrying its new version.
    pub async fn save(&self, graph: &Graph) -> Result<Graph> {
        let mut tx = self.pool.begin().await?;

        let current: Option<i64> = sqlx::query("SELECT version FROM graphs WHERE id = ?")
            .bind(&graph.id)
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.get("version"));

        let mut stored = graph.clone();
        stored.version = current.unwrap_or(0) + 1;
        let definition_json = serde_json::to_string(&stored)?;

        sqlx::query(
            r#"
            INSERT INTO graphs (id, name, version, definition, updated_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                version = excluded.version,
                definition = excluded.definition,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&stored.id)
        .bind(&stored.name)
        .bind(stored.version)
        .bind(&definition_json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!("💾 Saved graph '{}' as version {}", stored.id, stored.version);
        Ok(stored)
    }

    /// Load a graph by ID
    pub async fn load(&self, id: &str) -> Result<Option<Graph>> {
        let row = sqlx::query("SELECT definition FROM graphs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let definition_json: String = row.get("definition");
                let graph: Graph = serde_json::from_str(&definition_json)?;
                Ok(Some(graph))
            }
            None => Ok(None),
        }
    }

    /// List all graphs with basic metadata
    pub async fn list(&self) -> Result<Vec<GraphMetadata>> {
        let rows = sqlx::query(
            "SELECT id, name, version, updated_at FROM graphs ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| GraphMetadata {
                id: row.get("id"),
                name: row.get("name"),
                version: row.get("version"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }
}
