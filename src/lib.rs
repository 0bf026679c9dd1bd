//! Grid-Loader: the loader worker of a distributed crawl/index pipeline
//!
//! This crate consumes job messages from a broker, retrieves the content named by
//! each loader action (rendering it in a headless browser when allowed, falling back
//! to a plain HTTP fetch), and hands the resulting WARC asset to the next pipeline
//! stage, either through the shared asset store or embedded in the outgoing message.

pub mod config;
pub mod executor;
pub mod listener;
pub mod memory;
pub mod message;
pub mod retrieval;
pub mod storage;

use thiserror::Error;

/// Main error type for Grid-Loader operations
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Broker error: {0}")]
    Broker(#[from] listener::BrokerError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Errors raised while decoding or validating a job message
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Schema violation: {0}")]
    Schema(String),

    #[error("Duplicate crawl descriptor id: {0}")]
    DuplicateDescriptor(String),

    #[error("Invalid embedded asset {name}: {source}")]
    AssetEncoding {
        name: String,
        source: base64::DecodeError,
    },
}

/// Result type alias for Grid-Loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use executor::{ActionExecutor, ActionResult, FailureReason};
pub use listener::Listener;
pub use message::{Action, CrawlDescriptor, JobMessage};
