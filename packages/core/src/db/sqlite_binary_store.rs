//! libsql-backed BinaryStore
//!
//! Blobs live in a single table of an embedded SQLite-compatible database:
//!
//! ```sql
//! CREATE TABLE binaries (
//!     path TEXT NOT NULL,
//!     workspace_id INTEGER NOT NULL,
//!     idx INTEGER NOT NULL,
//!     data BLOB NOT NULL,
//!     PRIMARY KEY (path, workspace_id, idx)
//! )
//! ```

use crate::db::{BinaryStore, BlobKey, DatabaseError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use libsql::{Builder, Connection, Database};
use std::path::PathBuf;
use std::sync::Arc;

pub struct LibsqlBinaryStore {
    db: Arc<Database>,
    db_path: PathBuf,
}

impl LibsqlBinaryStore {
    /// Open (or create) the database file and make sure the table exists
    pub async fn open(db_path: PathBuf) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let store = Self {
            db: Arc::new(db),
            db_path,
        };
        store.initialize_schema().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    async fn connect_with_timeout(&self) -> Result<Connection, DatabaseError> {
        let conn = self.db.connect()?;
        // PRAGMA statements return rows, so they go through query()
        let mut stmt = conn.prepare("PRAGMA busy_timeout = 5000").await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to set busy timeout: {}", e))
        })?;
        stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to set busy timeout: {}", e))
        })?;
        Ok(conn)
    }

    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS binaries (
                path TEXT NOT NULL,
                workspace_id INTEGER NOT NULL,
                idx INTEGER NOT NULL,
                data BLOB NOT NULL,
                PRIMARY KEY (path, workspace_id, idx)
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create binaries table: {}", e))
        })?;
        Ok(())
    }
}

#[async_trait]
impl BinaryStore for LibsqlBinaryStore {
    async fn put(&self, key: &BlobKey, bytes: &[u8]) -> Result<()> {
        let conn = self.connect_with_timeout().await?;
        conn.execute(
            "INSERT INTO binaries (path, workspace_id, idx, data) VALUES (?, ?, ?, ?)
             ON CONFLICT (path, workspace_id, idx) DO UPDATE SET data = excluded.data",
            (
                key.path.as_str(),
                key.workspace.as_i64(),
                key.index as i64,
                bytes.to_vec(),
            ),
        )
        .await
        .with_context(|| format!("Failed to store blob {}", key))?;
        Ok(())
    }

    async fn get(&self, key: &BlobKey) -> Result<Option<Vec<u8>>> {
        let conn = self.connect_with_timeout().await?;
        let mut rows = conn
            .query(
                "SELECT data FROM binaries WHERE path = ? AND workspace_id = ? AND idx = ?",
                (key.path.as_str(), key.workspace.as_i64(), key.index as i64),
            )
            .await
            .with_context(|| format!("Failed to read blob {}", key))?;

        match rows.next().await.context("Failed to fetch blob row")? {
            Some(row) => {
                let data: Vec<u8> = row.get(0).context("Failed to get data")?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }
}
