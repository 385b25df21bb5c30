//! Persistence configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Backend type for persistence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Fjall (local LSM-tree storage)
    #[default]
    Fjall,
    /// Volatile in-process maps
    Memory,
}

fn default_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Backend type
    pub backend: BackendType,

    /// Data directory path (for fjall)
    pub path: PathBuf,

    /// Upper bound for a single store call (e.g., "500ms", "2s").
    /// Hooks fail closed when it is exceeded.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Fjall,
            path: PathBuf::from("./data"),
            timeout: default_timeout(),
        }
    }
}
