//! Configuration loading.
//!
//! Sources are merged in this order (later sources override earlier):
//! 1. Defaults from `AppConfig::default()`
//! 2. TOML file: `$ROLEGATE_CONFIG` if set, otherwise `./rolegate.toml` when present
//! 3. Environment variables prefixed `ROLEGATE_`; nested keys use a double
//!    underscore (`ROLEGATE_ROLES__CACHE_FRESHNESS_SECS`)

use std::path::{Path, PathBuf};

use chrono::Duration;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rolegate_auth::test_mode::{DEFAULT_TEST_KEY_PREFIX, TestModePolicy};
use rolegate_observability::LogFormat;

pub const ENV_PREFIX: &str = "ROLEGATE_";
pub const CONFIG_PATH_ENV: &str = "ROLEGATE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "rolegate.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Postgres URL. In-memory stores are used when absent.
    pub database_url: Option<String>,
    /// Redis URL for cross-instance role-change notifications.
    pub redis_url: Option<String>,
    pub log: LogConfig,
    pub roles: RolesConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            database_url: None,
            redis_url: None,
            log: LogConfig::default(),
            roles: RolesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    pub cache_freshness_secs: u64,
    pub test_mode_window_secs: u64,
    pub test_key_prefix: String,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            cache_freshness_secs: 300,
            test_mode_window_secs: 4 * 60 * 60,
            test_key_prefix: DEFAULT_TEST_KEY_PREFIX.to_string(),
        }
    }
}

impl RolesConfig {
    pub fn cache_freshness(&self) -> Duration {
        seconds(self.cache_freshness_secs)
    }

    pub fn test_mode_policy(&self) -> TestModePolicy {
        TestModePolicy {
            key_prefix: self.test_key_prefix.clone(),
            session_window: seconds(self.test_mode_window_secs),
            ..TestModePolicy::default()
        }
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1_000))
}

impl AppConfig {
    /// Load from the default sources.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::from_figment(Self::figment(Some(&path)))
    }

    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));

        if let Some(path) = path {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            } else {
                tracing::debug!(path = %path.display(), "config file not found; using defaults and environment");
            }
        }

        figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("bind_addr cannot be empty".to_string()));
        }
        if self.roles.cache_freshness_secs == 0 {
            return Err(ConfigError::Invalid(
                "roles.cache_freshness_secs must be greater than 0".to_string(),
            ));
        }
        if self.roles.test_mode_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "roles.test_mode_window_secs must be greater than 0".to_string(),
            ));
        }
        if self.roles.test_key_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "roles.test_key_prefix cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
