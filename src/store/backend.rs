//! Storage backend trait for the gate tables.
//!
//! Three tables: device sessions, permission rules and retained messages.
//! Each method is a single row-level operation and must be atomic on its own;
//! multi-step read-modify-write sequences are serialized by the callers.

use async_trait::async_trait;

use super::error::Result;
use super::models::{DeviceRecord, PermissionRule, RetainedEntry};

/// Storage backend trait for persistence
#[async_trait]
pub trait StorageBackend: Send + Sync {
    // ========================================================================
    // Device sessions
    // ========================================================================

    /// Get a device record by connection id
    async fn get_device(&self, connection_id: &str) -> Result<Option<DeviceRecord>>;

    /// Insert or replace a device record
    async fn put_device(&self, record: &DeviceRecord) -> Result<()>;

    /// List all device records
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>>;

    // ========================================================================
    // Permission rules
    // ========================================================================

    /// List rules for one role
    async fn rules_for_role(&self, role: &str) -> Result<Vec<PermissionRule>>;

    /// List every rule
    async fn list_rules(&self) -> Result<Vec<PermissionRule>>;

    /// Insert or replace a rule keyed by (role, topic filter)
    async fn put_rule(&self, rule: &PermissionRule) -> Result<()>;

    /// Delete a rule, returns whether it existed
    async fn delete_rule(&self, role: &str, topic_filter: &str) -> Result<bool>;

    // ========================================================================
    // Retained messages
    // ========================================================================

    /// Get a retained message by topic
    async fn get_retained(&self, topic: &str) -> Result<Option<RetainedEntry>>;

    /// Insert or replace a retained message
    async fn put_retained(&self, entry: &RetainedEntry) -> Result<()>;

    /// Delete a retained message, no-op if absent
    async fn delete_retained(&self, topic: &str) -> Result<()>;

    /// List all retained messages
    async fn list_retained(&self) -> Result<Vec<RetainedEntry>>;

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Flush all pending writes to disk
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Close the backend (flush and release resources)
    async fn close(&self) -> Result<()> {
        self.flush().await
    }
}
