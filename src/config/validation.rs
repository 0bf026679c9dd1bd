use crate::config::types::{
    BrokerConfig, Config, HttpConfig, LoaderConfig, MemoryConfig, RenderConfig, StorageConfig,
    UserAgentConfig, UserAgentKind,
};
use crate::ConfigError;

/// One year
const MAX_CACHE_HORIZON_SECS: u64 = 365 * 24 * 3600;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_loader_config(&config.loader)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_render_config(&config.render)?;
    validate_http_config(&config.http)?;
    validate_memory_config(&config.memory)?;
    validate_storage_config(&config.storage)?;
    validate_broker_config(&config.broker)?;
    Ok(())
}

/// Validates loader configuration
fn validate_loader_config(config: &LoaderConfig) -> Result<(), ConfigError> {
    if config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 0 and 256, got {}",
            config.workers
        )));
    }

    if config.queue.is_empty() {
        return Err(ConfigError::Validation("queue cannot be empty".to_string()));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.kind == UserAgentKind::Custom
        && config.name.as_deref().map_or(true, |name| name.trim().is_empty())
    {
        return Err(ConfigError::Validation(
            "user-agent name is required when kind is \"custom\"".to_string(),
        ));
    }

    if let Some(name) = &config.name {
        if name.chars().any(|c| c.is_control()) {
            return Err(ConfigError::Validation(
                "user-agent name cannot contain control characters".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates headless rendering configuration
fn validate_render_config(config: &RenderConfig) -> Result<(), ConfigError> {
    if config.cache_capacity < 1 {
        return Err(ConfigError::Validation(format!(
            "cache-capacity must be >= 1, got {}",
            config.cache_capacity
        )));
    }

    if config.cache_horizon_secs < 1 || config.cache_horizon_secs > MAX_CACHE_HORIZON_SECS {
        return Err(ConfigError::Validation(format!(
            "cache-horizon-secs must be between 1 and {}, got {}",
            MAX_CACHE_HORIZON_SECS, config.cache_horizon_secs
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "render timeout-secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    Ok(())
}

/// Validates HTTP client configuration
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "http timeout-secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    if config.connect_timeout_secs < 1 || config.connect_timeout_secs > config.timeout_secs {
        return Err(ConfigError::Validation(format!(
            "connect-timeout-secs must be between 1 and timeout-secs ({}), got {}",
            config.timeout_secs, config.connect_timeout_secs
        )));
    }

    Ok(())
}

/// Validates memory pressure configuration
fn validate_memory_config(config: &MemoryConfig) -> Result<(), ConfigError> {
    if !(config.short_ratio > 0.0 && config.short_ratio < 1.0) {
        return Err(ConfigError::Validation(format!(
            "short-ratio must be between 0 and 1 (exclusive), got {}",
            config.short_ratio
        )));
    }

    Ok(())
}

/// Validates asset store configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates broker configuration
fn validate_broker_config(config: &BrokerConfig) -> Result<(), ConfigError> {
    if config.spool_dir.is_empty() {
        return Err(ConfigError::Validation(
            "spool-dir cannot be empty".to_string(),
        ));
    }

    if config.poll_interval_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "poll-interval-ms must be >= 10ms, got {}ms",
            config.poll_interval_ms
        )));
    }

    Ok(())
}
