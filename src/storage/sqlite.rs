//! SQLite asset store
//!
//! This module provides a SQLite-based implementation of the AssetStore trait.
//! Database calls run on the blocking thread pool so that workers never stall
//! the async runtime while SQLite holds its lock.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{AssetStore, StorageError, StorageResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite asset store
#[derive(Clone)]
pub struct SqliteAssetStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAssetStore {
    /// Opens or creates the asset database at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteAssetStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory store
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of stored assets
    pub async fn asset_count(&self) -> StorageResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StorageError::Unavailable("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StorageError::Unavailable(e.to_string()))?
    }
}

#[async_trait]
impl AssetStore for SqliteAssetStore {
    async fn store(&self, name: &str, bytes: &[u8]) -> StorageResult<()> {
        if name.is_empty() {
            return Err(StorageError::InvalidName(name.to_string()));
        }

        let name = name.to_string();
        let bytes = bytes.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO assets (name, bytes, size, stored_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                    bytes = excluded.bytes,
                    size = excluded.size,
                    stored_at = excluded.stored_at",
                params![name, bytes, bytes.len() as i64, Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn load(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let bytes = conn
                .query_row(
                    "SELECT bytes FROM assets WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(bytes)
        })
        .await
    }
}
