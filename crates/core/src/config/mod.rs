//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PAGEFETCH_*, nested keys split on `__`)
//! 2. TOML config file (if PAGEFETCH_CONFIG_FILE set)
//! 3. Built-in defaults

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::CacheSettings;
use crate::duration::parse_duration;
use crate::policy::{DomainRules, PolicyGate, PolicyMode, RobotsStance};

mod validation;

pub use validation::ConfigError;

pub const ENV_PREFIX: &str = "PAGEFETCH_";
pub const CONFIG_FILE_ENV: &str = "PAGEFETCH_CONFIG_FILE";

/// Renderer options.
///
/// Set via PAGEFETCH_RENDER__<FIELD> environment variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Fixed delay after load, in milliseconds.
    #[serde(default)]
    pub wait_ms: u64,

    /// CSS selector to wait for, or `network-idle`.
    #[serde(default)]
    pub wait_for: Option<String>,

    /// Capture a full-page screenshot alongside the DOM snapshot.
    #[serde(default)]
    pub screenshot: bool,

    /// Run the browser with a visible window.
    #[serde(default)]
    pub headful: bool,

    /// Browser profile directory to reuse.
    #[serde(default)]
    pub profile_dir: Option<PathBuf>,

    /// Reuse the platform's default Chrome/Chromium/Edge profile.
    #[serde(default)]
    pub use_system_profile: bool,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PAGEFETCH_*)
/// 2. TOML config file (if PAGEFETCH_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Managed cache root.
    ///
    /// Set via PAGEFETCH_CACHE_DIR environment variable.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Entry lifetime in the duration grammar (`30s`, `15m`, `24h`, `7d`, `2w`).
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: String,

    /// Cache size budget in megabytes.
    #[serde(default = "default_cache_max_mb")]
    pub cache_max_mb: u64,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Skip cache reads for this process while still writing.
    #[serde(default)]
    pub cache_fresh: bool,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via PAGEFETCH_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// HTTP(S) proxy URL.
    #[serde(default)]
    pub proxy: Option<String>,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via PAGEFETCH_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via PAGEFETCH_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    #[serde(default = "default_true")]
    pub follow_redirects: bool,

    /// Run bot-wall and needs-render heuristics on fetched bodies.
    #[serde(default = "default_true")]
    pub detect_blocks: bool,

    /// Host suffixes that may be fetched. Empty permits all hosts not blocked.
    #[serde(default)]
    pub allow_domains: Vec<String>,

    /// Host suffixes that may never be fetched.
    #[serde(default)]
    pub block_domains: Vec<String>,

    #[serde(default)]
    pub policy: PolicyMode,

    #[serde(default)]
    pub robots: RobotsStance,

    /// Directory for DOM snapshots and screenshots. Defaults to `<cache_dir>/evidence`.
    #[serde(default)]
    pub evidence_dir: Option<PathBuf>,

    /// Whether rendered mode (headless browser) is enabled.
    ///
    /// Set via PAGEFETCH_RENDER_ENABLED environment variable.
    #[serde(default)]
    pub render_enabled: bool,

    #[serde(default)]
    pub render: RenderConfig,
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache")).join("pagefetch")
}

fn default_cache_ttl() -> String {
    "7d".into()
}

fn default_cache_max_mb() -> u64 {
    1024
}

fn default_user_agent() -> String {
    "pagefetch/0.1".into()
}

fn default_max_bytes() -> u64 {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            cache_ttl: default_cache_ttl(),
            cache_max_mb: default_cache_max_mb(),
            cache_enabled: true,
            cache_fresh: false,
            timeout_ms: default_timeout_ms(),
            proxy: None,
            user_agent: default_user_agent(),
            headers: BTreeMap::new(),
            max_bytes: default_max_bytes(),
            follow_redirects: true,
            detect_blocks: true,
            allow_domains: Vec::new(),
            block_domains: Vec::new(),
            policy: PolicyMode::default(),
            robots: RobotsStance::default(),
            evidence_dir: None,
            render_enabled: false,
            render: RenderConfig::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parsed `cache_ttl`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the value is outside the duration grammar.
    pub fn cache_ttl(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.cache_ttl)
            .map_err(|e| ConfigError::Invalid { field: "cache_ttl".into(), reason: e.to_string() })
    }

    /// Cache settings derived from the `cache_*` fields.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `cache_ttl` does not parse.
    pub fn cache_settings(&self) -> Result<CacheSettings, ConfigError> {
        Ok(CacheSettings {
            ttl: self.cache_ttl()?,
            enabled: self.cache_enabled,
            fresh: self.cache_fresh,
            ..CacheSettings::new(&self.cache_dir).with_max_mb(self.cache_max_mb)
        })
    }

    pub fn evidence_dir(&self) -> PathBuf {
        self.evidence_dir.clone().unwrap_or_else(|| self.cache_dir.join("evidence"))
    }

    pub fn domain_rules(&self) -> DomainRules {
        DomainRules::new(self.allow_domains.iter().cloned(), self.block_domains.iter().cloned())
    }

    pub fn policy_gate(&self) -> PolicyGate {
        PolicyGate::new(self.domain_rules(), self.policy)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `PAGEFETCH_`
    /// 2. TOML file from `PAGEFETCH_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var(CONFIG_FILE_ENV) {
            figment = figment.merge(Toml::file(&config_path));
        }

        Self::extract(figment.merge(Self::env_provider()))
    }

    fn env_provider() -> Env {
        Env::prefixed(ENV_PREFIX)
            .ignore(&["config_file"])
            .map(|key| key.as_str().to_lowercase().into())
            .split("__")
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
