//! Device Session Tracker
//!
//! Durable per-device connectivity state machine. The hook path only ever
//! moves a record between `Online` and `Offline`; `Disconnected` and
//! `Deleted` are entered through the administrative operations and are never
//! left by a connect or disconnect event.
//!
//! Every read-modify-write on a record runs under a lock striped by
//! connection id, so two events for the same device serialize while events
//! for different devices proceed in parallel.

use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{GateError, GateResult};
use crate::store::{bounded, DeviceRecord, DeviceStatus, StorageBackend};

#[cfg(test)]
mod tests;

const LOCK_STRIPES: usize = 64;

/// Result of a disconnect notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// Record moved to `Offline`
    MarkedOffline,
    /// Record was in a sticky status and kept it
    Unchanged(DeviceStatus),
    /// No record for this connection id (services, super-users)
    NotRegistered,
}

/// Fixed set of mutexes selected by key hash
struct StripedLocks {
    hasher: RandomState,
    stripes: Vec<Mutex<()>>,
}

impl StripedLocks {
    fn new(count: usize) -> Self {
        Self {
            hasher: RandomState::new(),
            stripes: (0..count).map(|_| Mutex::new(())).collect(),
        }
    }

    async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        let idx = (self.hasher.hash_one(key) as usize) % self.stripes.len();
        self.stripes[idx].lock().await
    }
}

/// Tracks connectivity status of provisioned devices
pub struct DeviceTracker {
    backend: Arc<dyn StorageBackend>,
    timeout: Duration,
    locks: StripedLocks,
}

impl DeviceTracker {
    pub fn new(backend: Arc<dyn StorageBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            locks: StripedLocks::new(LOCK_STRIPES),
        }
    }

    /// Admit a device connection: the record must exist and must not be in a
    /// sticky status. On success the record is `Online` with a fresh
    /// `last_seen`; on rejection nothing is written.
    pub async fn mark_connected(&self, connection_id: &str) -> GateResult<DeviceRecord> {
        let _guard = self.locks.lock(connection_id).await;

        let mut record = bounded(self.timeout, self.backend.get_device(connection_id))
            .await?
            .ok_or(GateError::UnknownDevice)?;

        match record.status {
            DeviceStatus::Disconnected => return Err(GateError::DeviceDisconnected),
            DeviceStatus::Deleted => return Err(GateError::DeviceDeleted),
            DeviceStatus::Online | DeviceStatus::Offline => {}
        }

        record.transition(DeviceStatus::Online);
        bounded(self.timeout, self.backend.put_device(&record)).await?;

        debug!("Device {} is now Online", connection_id);
        Ok(record)
    }

    /// Record a transport-level disconnect
    pub async fn mark_disconnected(&self, connection_id: &str) -> GateResult<DisconnectOutcome> {
        let _guard = self.locks.lock(connection_id).await;

        let Some(mut record) = bounded(self.timeout, self.backend.get_device(connection_id)).await?
        else {
            return Ok(DisconnectOutcome::NotRegistered);
        };

        if record.status.is_sticky() {
            debug!(
                "Device {} keeps status {} on disconnect",
                connection_id, record.status
            );
            return Ok(DisconnectOutcome::Unchanged(record.status));
        }

        record.transition(DeviceStatus::Offline);
        bounded(self.timeout, self.backend.put_device(&record)).await?;

        debug!("Device {} is now Offline", connection_id);
        Ok(DisconnectOutcome::MarkedOffline)
    }

    // ========================================================================
    // Administrative operations
    // ========================================================================

    /// Create a device record, or reset an existing one to `Offline`.
    ///
    /// This is the only way out of `Disconnected`/`Deleted`.
    pub async fn provision(
        &self,
        connection_id: &str,
        device_id: &str,
    ) -> GateResult<DeviceRecord> {
        let _guard = self.locks.lock(connection_id).await;

        let record = DeviceRecord::new(connection_id, device_id);
        bounded(self.timeout, self.backend.put_device(&record)).await?;

        info!("Provisioned device {} ({})", connection_id, device_id);
        Ok(record)
    }

    /// Mark a device `Disconnected`. Returns `false` if no record exists.
    pub async fn force_disconnect(&self, connection_id: &str) -> GateResult<bool> {
        self.set_sticky(connection_id, DeviceStatus::Disconnected).await
    }

    /// Mark a device `Deleted`. Returns `false` if no record exists.
    pub async fn delete(&self, connection_id: &str) -> GateResult<bool> {
        self.set_sticky(connection_id, DeviceStatus::Deleted).await
    }

    async fn set_sticky(&self, connection_id: &str, status: DeviceStatus) -> GateResult<bool> {
        let _guard = self.locks.lock(connection_id).await;

        let Some(mut record) = bounded(self.timeout, self.backend.get_device(connection_id)).await?
        else {
            info!("Device {} not found, cannot set {}", connection_id, status);
            return Ok(false);
        };

        record.transition(status);
        bounded(self.timeout, self.backend.put_device(&record)).await?;

        info!("Device {} set to {}", connection_id, status);
        Ok(true)
    }

    /// Get a device record
    pub async fn get(&self, connection_id: &str) -> GateResult<Option<DeviceRecord>> {
        Ok(bounded(self.timeout, self.backend.get_device(connection_id)).await?)
    }

    /// List all device records
    pub async fn list(&self) -> GateResult<Vec<DeviceRecord>> {
        Ok(bounded(self.timeout, self.backend.list_devices()).await?)
    }
}
