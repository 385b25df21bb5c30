//! Durable store for the gate.
//!
//! Holds three tables:
//! - Device sessions (connectivity status per provisioned device)
//! - Permission rules (role -> topic filter -> action)
//! - Retained messages (last payload per topic)
//!
//! Uses a trait-based design allowing different backends:
//! - `FjallBackend` (default) - Local LSM-tree storage
//! - `MemoryBackend` - Volatile, for tests and ephemeral deployments

mod backend;
mod error;
mod fjall;
mod memory;
mod models;
#[cfg(test)]
pub(crate) mod testing;

pub use backend::StorageBackend;
pub use error::{PersistenceError, Result};
pub use fjall::FjallBackend;
pub use memory::MemoryBackend;
pub use models::{DeviceRecord, DeviceStatus, PermissionRule, RetainedEntry};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{BackendType, PersistenceConfig};

/// Open the backend selected by configuration
pub fn open_backend(config: &PersistenceConfig) -> Result<Arc<dyn StorageBackend>> {
    match config.backend {
        BackendType::Fjall => {
            info!("Opening fjall store at {}", config.path.display());
            Ok(Arc::new(FjallBackend::open(&config.path)?))
        }
        BackendType::Memory => {
            info!("Using in-memory store (nothing will be persisted)");
            Ok(Arc::new(MemoryBackend::new()))
        }
    }
}

/// Run a store operation with an upper time bound.
///
/// Elapsed time surfaces as `PersistenceError::Timeout` so hook callers can
/// fail closed instead of hanging on an unavailable store.
pub async fn bounded<T, F>(limit: Duration, op: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, op).await?
}
