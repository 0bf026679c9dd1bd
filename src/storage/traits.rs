//! Storage traits and error types
//!
//! This module defines the trait interface for asset store backends and
//! associated error types.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Asset store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid asset name: {0:?}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Shared store for pipeline assets
///
/// Implementations must be safe to use from many workers at once. A failed
/// `store` must not leave a partial asset behind.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Stores `bytes` under `name`, replacing any previous asset
    async fn store(&self, name: &str, bytes: &[u8]) -> StorageResult<()>;

    /// Loads the asset stored under `name`
    async fn load(&self, name: &str) -> StorageResult<Option<Vec<u8>>>;
}
