/**
 * SQLite Document Store
 *
 * Persists document snapshots in a single `documents` table. The table is
 * created on connect so a fresh database file works without migrations.
 */

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::backend::documents::DocumentStore;
use crate::backend::error::SyncError;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY NOT NULL,
        snapshot BLOB NOT NULL,
        updated_at TEXT NOT NULL
    )
"#;

/// Document store backed by a SQLite database
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Connect and make sure the schema exists
    ///
    /// In-memory URLs (`sqlite::memory:`) are limited to one connection so
    /// every query sees the same database.
    pub async fn connect(database_url: &str) -> Result<Self, SyncError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let in_memory = database_url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            // The database lives only as long as its single connection.
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;

        tracing::info!("[Documents] Connected to {}", database_url);
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, SyncError> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Insert a new document; fails if the ID is taken
    pub async fn create(&self, document_id: &str, snapshot: &[u8]) -> Result<(), SyncError> {
        sqlx::query("INSERT INTO documents (id, snapshot, updated_at) VALUES (?, ?, ?)")
            .bind(document_id)
            .bind(snapshot)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Last save time in RFC3339, if the document exists
    pub async fn updated_at(&self, document_id: &str) -> Result<Option<String>, SyncError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT updated_at FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(updated_at,)| updated_at))
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn read(&self, document_id: &str) -> Result<Vec<u8>, SyncError> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT snapshot FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(snapshot,)| snapshot)
            .ok_or_else(|| SyncError::document_not_found(document_id))
    }

    async fn save(&self, document_id: &str, snapshot: &[u8]) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, snapshot, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                snapshot = excluded.snapshot,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(document_id)
        .bind(snapshot)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::debug!("[Documents] Saved {} ({} bytes)", document_id, snapshot.len());
        Ok(())
    }
}
