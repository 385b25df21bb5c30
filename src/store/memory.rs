//! In-memory storage backend.
//!
//! Nothing survives a restart. Used by tests and by deployments that keep
//! provisioning data elsewhere and only need the gate's runtime behavior.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::backend::StorageBackend;
use super::error::Result;
use super::models::{DeviceRecord, PermissionRule, RetainedEntry};

/// In-memory storage backend
#[derive(Default)]
pub struct MemoryBackend {
    devices: RwLock<BTreeMap<String, DeviceRecord>>,
    rules: RwLock<BTreeMap<(String, String), PermissionRule>>,
    retained: RwLock<BTreeMap<String, RetainedEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get_device(&self, connection_id: &str) -> Result<Option<DeviceRecord>> {
        Ok(self.devices.read().get(connection_id).cloned())
    }

    async fn put_device(&self, record: &DeviceRecord) -> Result<()> {
        self.devices
            .write()
            .insert(record.connection_id.clone(), record.clone());
        Ok(())
    }

    async fn list_devices(&self) -> Result<Vec<DeviceRecord>> {
        Ok(self.devices.read().values().cloned().collect())
    }

    async fn rules_for_role(&self, role: &str) -> Result<Vec<PermissionRule>> {
        Ok(self
            .rules
            .read()
            .values()
            .filter(|r| r.role == role)
            .cloned()
            .collect())
    }

    async fn list_rules(&self) -> Result<Vec<PermissionRule>> {
        Ok(self.rules.read().values().cloned().collect())
    }

    async fn put_rule(&self, rule: &PermissionRule) -> Result<()> {
        self.rules.write().insert(
            (rule.role.clone(), rule.topic_filter.clone()),
            rule.clone(),
        );
        Ok(())
    }

    async fn delete_rule(&self, role: &str, topic_filter: &str) -> Result<bool> {
        Ok(self
            .rules
            .write()
            .remove(&(role.to_string(), topic_filter.to_string()))
            .is_some())
    }

    async fn get_retained(&self, topic: &str) -> Result<Option<RetainedEntry>> {
        Ok(self.retained.read().get(topic).cloned())
    }

    async fn put_retained(&self, entry: &RetainedEntry) -> Result<()> {
        self.retained
            .write()
            .insert(entry.topic.clone(), entry.clone());
        Ok(())
    }

    async fn delete_retained(&self, topic: &str) -> Result<()> {
        self.retained.write().remove(topic);
        Ok(())
    }

    async fn list_retained(&self) -> Result<Vec<RetainedEntry>> {
        Ok(self.retained.read().values().cloned().collect())
    }
}
