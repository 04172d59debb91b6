//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use crate::headers::is_restricted;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `cache_ttl` does not parse or `cache_max_mb` is 0
    /// - `headers` names a restricted header
    /// - both `render.profile_dir` and `render.use_system_profile` are set
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        self.cache_ttl()?;
        if self.cache_max_mb == 0 {
            return Err(invalid("cache_max_mb", "must be greater than 0"));
        }

        if let Some(name) = self.headers.keys().find(|name| is_restricted(name)) {
            return Err(invalid("headers", format!("refusing to set restricted header: {name}")));
        }

        if self.render.profile_dir.is_some() && self.render.use_system_profile {
            return Err(invalid("render", "profile_dir and use_system_profile are mutually exclusive"));
        }

        if self.policy.requires_allow_list() && self.allow_domains.is_empty() {
            tracing::warn!("strict policy without allow_domains; every network operation will be refused");
        }

        Ok(())
    }
}
