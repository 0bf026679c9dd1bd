//! Storage module for pipeline assets
//!
//! This module handles persistence of the assets the loader produces:
//! - The `AssetStore` trait shared by all backends
//! - A SQLite backend storing each asset as one row
//!
//! Later pipeline stages read the asset back by the `sourceasset` name.

mod schema;
mod sqlite;
mod traits;

pub use schema::initialize_schema;
pub use sqlite::SqliteAssetStore;
pub use traits::{AssetStore, StorageError, StorageResult};

use std::path::Path;

/// Opens the asset store configured at `path`
pub fn open_store(path: &Path) -> StorageResult<SqliteAssetStore> {
    SqliteAssetStore::new(path)
}
