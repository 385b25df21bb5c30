//! Configuration Module
//!
//! Provides TOML-based configuration for MqGate with support for:
//! - Logging level
//! - Token verification (secret, super-user name, service policy)
//! - The reserved broadcast topic
//! - Persistence backend selection
//! - Environment variable overrides (MQGATE__* prefix)

use std::path::Path;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

pub use persistence::{BackendType, PersistenceConfig};

mod persistence;

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}


/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Token verification and principal classification
    pub auth: AuthConfig,
    /// Topic rewriting
    pub topics: TopicsConfig,
    /// Durable store
    pub persistence: PersistenceConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// How service principals are authorized on publish/subscribe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServicePolicy {
    /// Services go through the permission rules of their role
    #[default]
    Rules,
    /// Services are allowed everything
    Trusted,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret bearer tokens are signed with
    pub token_secret: String,
    /// Username that connects as super-user without a token
    #[serde(default = "default_super_username")]
    pub super_username: String,
    /// Authorization policy for service principals
    pub service_policy: ServicePolicy,
    /// Clock skew tolerated on token expiry (e.g., "0s", "30s")
    #[serde(default, with = "humantime_serde")]
    pub token_leeway: Duration,
}

fn default_super_username() -> String {
    "super".to_string()
}

/// Largest accepted `auth.token_leeway`
pub const MAX_TOKEN_LEEWAY: Duration = Duration::from_secs(24 * 60 * 60);

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: String::new(),
            super_username: default_super_username(),
            service_policy: ServicePolicy::Rules,
            token_leeway: Duration::ZERO,
        }
    }
}

/// Topic configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    /// Broadcast topic that gets scoped to the publisher
    #[serde(default = "default_reserved_topic")]
    pub reserved: String,
}

fn default_reserved_topic() -> String {
    "emergency_stop".to_string()
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            reserved: default_reserved_topic(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `MQGATE__` prefix with double underscores for nesting:
    ///    - `MQGATE__AUTH__TOKEN_SECRET=...` overrides `auth.token_secret`
    ///    - `MQGATE__PERSISTENCE__PATH=/var/lib/mqgate` overrides `persistence.path`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::build(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration for the admin tool.
    ///
    /// Same sources as [`Config::load`], with the file optional. Only the
    /// store and topic settings are validated, so provisioning works on a
    /// host that does not hold the token secret.
    pub fn load_for_admin(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = Self::build(path.unwrap_or(Path::new("")))?;
        config.validate_store()?;
        Ok(config)
    }

    fn build(path: &Path) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            // Start with defaults
            .set_default("log.level", "warn")?
            .set_default("auth.super_username", "super")?
            .set_default("auth.service_policy", "rules")?
            .set_default("auth.token_leeway", "0s")?
            .set_default("topics.reserved", "emergency_stop")?
            .set_default("persistence.backend", "fjall")?
            .set_default("persistence.path", "./data")?
            .set_default("persistence.timeout", "2s")?;

        // Load from file with env var substitution
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Override with environment variables (MQGATE__AUTH__TOKEN_SECRET, etc.)
        let cfg = builder
            .add_source(
                Environment::with_prefix("MQGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(cfg.try_deserialize()?)
    }

    /// Load configuration with environment variable overrides only (no file).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.token_secret.is_empty() {
            return Err(ConfigError::Validation(
                "auth.token_secret is required".to_string(),
            ));
        }

        if self.auth.super_username.is_empty() {
            return Err(ConfigError::Validation(
                "auth.super_username cannot be empty".to_string(),
            ));
        }

        if self.auth.token_leeway > MAX_TOKEN_LEEWAY {
            return Err(ConfigError::Validation(format!(
                "auth.token_leeway cannot exceed {}s",
                MAX_TOKEN_LEEWAY.as_secs()
            )));
        }

        self.validate_store()
    }

    /// Validate the settings the admin tool needs: topics and persistence
    pub fn validate_store(&self) -> Result<(), ConfigError> {
        if let Err(e) = crate::topic::validate_topic_name(&self.topics.reserved) {
            return Err(ConfigError::Validation(format!(
                "topics.reserved '{}' is not a valid topic name: {}",
                self.topics.reserved, e
            )));
        }

        if self.persistence.timeout.is_zero() {
            return Err(ConfigError::Validation(
                "persistence.timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
