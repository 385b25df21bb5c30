//! Retained-Message Store
//!
//! Durable record of the last retained payload per topic. Publishes with the
//! retain flag are persisted before the publish decision goes back to the
//! broker engine; at startup every stored entry is handed to the engine's
//! in-memory retained cache.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::error::GateResult;
use crate::hooks::RetainedCache;
use crate::store::{bounded, RetainedEntry, StorageBackend};
use crate::types::QoS;


/// What a publish did to the retained store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetainedAction {
    /// Not a retained publish
    Ignored,
    /// Payload stored for the topic
    Stored,
    /// Empty payload cleared the topic
    Cleared,
}

/// Counts from a startup restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub skipped: usize,
}

/// Retained message persistence
pub struct RetainedStore {
    backend: Arc<dyn StorageBackend>,
    timeout: Duration,
}

impl RetainedStore {
    pub fn new(backend: Arc<dyn StorageBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Insert or replace the retained message for `topic`
    pub async fn upsert(&self, topic: &str, payload: &[u8], qos: QoS) -> GateResult<()> {
        let entry = RetainedEntry::new(topic, payload, qos);
        bounded(self.timeout, self.backend.put_retained(&entry)).await?;
        debug!("Stored retained message for {} ({} bytes)", topic, payload.len());
        Ok(())
    }

    /// Drop the retained message for `topic`, if any
    pub async fn remove(&self, topic: &str) -> GateResult<()> {
        bounded(self.timeout, self.backend.delete_retained(topic)).await?;
        debug!("Cleared retained message for {}", topic);
        Ok(())
    }

    /// Apply the retain policy of one publish.
    ///
    /// An empty payload on a retained publish is the MQTT signal to clear
    /// the topic.
    pub async fn apply_publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> GateResult<RetainedAction> {
        if !retain {
            return Ok(RetainedAction::Ignored);
        }

        if payload.is_empty() {
            self.remove(topic).await?;
            Ok(RetainedAction::Cleared)
        } else {
            self.upsert(topic, payload, qos).await?;
            Ok(RetainedAction::Stored)
        }
    }

    pub async fn get(&self, topic: &str) -> GateResult<Option<RetainedEntry>> {
        Ok(bounded(self.timeout, self.backend.get_retained(topic)).await?)
    }

    pub async fn list(&self) -> GateResult<Vec<RetainedEntry>> {
        Ok(bounded(self.timeout, self.backend.list_retained()).await?)
    }

    /// Seed the engine's retained cache from durable state.
    ///
    /// Runs once before the engine accepts connections. A failure to read
    /// the table is returned; a failure to load one entry is logged and
    /// counted, and the rest are still loaded.
    pub async fn restore_all(&self, cache: &dyn RetainedCache) -> GateResult<RestoreReport> {
        let entries = self.list().await?;
        let mut report = RestoreReport::default();

        for entry in entries {
            let topic = entry.topic.clone();
            match cache.load_retained(entry).await {
                Ok(()) => report.restored += 1,
                Err(e) => {
                    error!("Failed to restore retained for {}: {}", topic, e);
                    report.skipped += 1;
                }
            }
        }

        info!(
            "Restored {} retained messages into broker memory ({} skipped)",
            report.restored, report.skipped
        );
        Ok(report)
    }
}
