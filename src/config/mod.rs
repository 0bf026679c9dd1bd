//! Configuration module for Grid-Loader
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use grid_loader::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("loader.toml")).unwrap();
//! println!("Loader presents itself as: {}", config.user_agent.user_agent());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrokerConfig, Config, HttpConfig, LoaderConfig, MemoryConfig, RenderConfig, StorageConfig,
    UserAgentConfig, UserAgentKind, BROWSER_AGENT, CRAWLER_AGENT, GOOGLE_AGENT,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
