//! Fjall-based storage backend implementation.
//!
//! Uses fjall (an LSM-tree based embedded database) for local persistence.

use std::path::Path;

use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use tracing::warn;

use super::backend::StorageBackend;
use super::error::{PersistenceError, Result};
use super::models::{DeviceRecord, PermissionRule, RetainedEntry};

/// Separates role and topic filter in rule keys. Neither may contain NUL.
const RULE_KEY_SEPARATOR: u8 = 0;

/// Fjall-based storage backend
pub struct FjallBackend {
    keyspace: Keyspace,
    devices: PartitionHandle,
    rules: PartitionHandle,
    retained: PartitionHandle,
}

impl FjallBackend {
    /// Open a fjall backend at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let keyspace = Config::new(path).open()?;

        let devices = keyspace.open_partition("devices", PartitionCreateOptions::default())?;
        let rules = keyspace.open_partition("rules", PartitionCreateOptions::default())?;
        let retained = keyspace.open_partition("retained", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            devices,
            rules,
            retained,
        })
    }

    fn rule_prefix(role: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(role.len() + 1);
        key.extend_from_slice(role.as_bytes());
        key.push(RULE_KEY_SEPARATOR);
        key
    }

    fn rule_key(role: &str, topic_filter: &str) -> Result<Vec<u8>> {
        if role.contains('\0') || topic_filter.contains('\0') {
            return Err(PersistenceError::InvalidKey(
                "rule role and filter cannot contain null character".to_string(),
            ));
        }
        let mut key = Self::rule_prefix(role);
        key.extend_from_slice(topic_filter.as_bytes());
        Ok(key)
    }

    /// Serialize a value using bincode
    fn serialize<T: bincode::Encode>(value: &T) -> Result<Vec<u8>> {
        bincode::encode_to_vec(value, bincode::config::standard()).map_err(PersistenceError::from)
    }

    /// Deserialize a value using bincode
    fn deserialize<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T> {
        bincode::decode_from_slice(bytes, bincode::config::standard())
            .map(|(value, _)| value)
            .map_err(PersistenceError::from)
    }
}

#[async_trait]
impl StorageBackend for FjallBackend {
    // ========================================================================
    // Device sessions
    // ========================================================================

    async fn get_device(&self, connection_id: &str) -> Result<Option<DeviceRecord>> {
        match self.devices.get(connection_id)? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put_device(&self, record: &DeviceRecord) -> Result<()> {
        let bytes = Self::serialize(record)?;
        self.devices.insert(record.connection_id.as_str(), bytes)?;
        Ok(())
    }

    async fn list_devices(&self) -> Result<Vec<DeviceRecord>> {
        let mut result = Vec::new();
        for item in self.devices.iter() {
            let (_, value) = item?;
            result.push(Self::deserialize(&value)?);
        }
        Ok(result)
    }

    // ========================================================================
    // Permission rules
    // ========================================================================

    async fn rules_for_role(&self, role: &str) -> Result<Vec<PermissionRule>> {
        let mut result = Vec::new();
        for item in self.rules.prefix(Self::rule_prefix(role)) {
            let (_, value) = item?;
            result.push(Self::deserialize(&value)?);
        }
        Ok(result)
    }

    async fn list_rules(&self) -> Result<Vec<PermissionRule>> {
        let mut result = Vec::new();
        for item in self.rules.iter() {
            let (_, value) = item?;
            result.push(Self::deserialize(&value)?);
        }
        Ok(result)
    }

    async fn put_rule(&self, rule: &PermissionRule) -> Result<()> {
        let key = Self::rule_key(&rule.role, &rule.topic_filter)?;
        let bytes = Self::serialize(rule)?;
        self.rules.insert(key, bytes)?;
        Ok(())
    }

    async fn delete_rule(&self, role: &str, topic_filter: &str) -> Result<bool> {
        let key = Self::rule_key(role, topic_filter)?;
        let existed = self.rules.contains_key(&key)?;
        if existed {
            self.rules.remove(key)?;
        }
        Ok(existed)
    }

    // ========================================================================
    // Retained messages
    // ========================================================================

    async fn get_retained(&self, topic: &str) -> Result<Option<RetainedEntry>> {
        match self.retained.get(topic)? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put_retained(&self, entry: &RetainedEntry) -> Result<()> {
        let bytes = Self::serialize(entry)?;
        self.retained.insert(entry.topic.as_str(), bytes)?;
        Ok(())
    }

    async fn delete_retained(&self, topic: &str) -> Result<()> {
        self.retained.remove(topic)?;
        Ok(())
    }

    async fn list_retained(&self) -> Result<Vec<RetainedEntry>> {
        let mut result = Vec::new();
        for item in self.retained.iter() {
            let (key, value) = item?;
            // A single unreadable row must not block restoring the others
            match Self::deserialize::<RetainedEntry>(&value) {
                Ok(entry) => result.push(entry),
                Err(e) => warn!(
                    "Skipping unreadable retained entry '{}': {}",
                    String::from_utf8_lossy(&key),
                    e
                ),
            }
        }
        Ok(result)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    async fn flush(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // fjall handles cleanup on drop
        self.flush().await
    }
}
