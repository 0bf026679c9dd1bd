//! Database schema definitions
//!
//! This module contains the SQL schema of the asset database.

use rusqlite::Connection;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Pipeline assets, keyed by their target asset path
CREATE TABLE IF NOT EXISTS assets (
    name TEXT PRIMARY KEY NOT NULL,
    bytes BLOB NOT NULL,
    size INTEGER NOT NULL,
    stored_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_assets_stored_at ON assets(stored_at);
"#;

/// Creates the tables if they do not exist yet
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
