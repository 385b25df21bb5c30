//! Backends that misbehave on purpose, for fail-closed tests.

use async_trait::async_trait;

use super::backend::StorageBackend;
use super::error::{PersistenceError, Result};
use super::models::{DeviceRecord, PermissionRule, RetainedEntry};

/// Every call fails with a storage error
pub(crate) struct UnavailableBackend;

fn down<T>() -> Result<T> {
    Err(PersistenceError::Backend("backend unavailable".to_string()))
}

#[async_trait]
impl StorageBackend for UnavailableBackend {
    async fn get_device(&self, _connection_id: &str) -> Result<Option<DeviceRecord>> {
        down()
    }
    async fn put_device(&self, _record: &DeviceRecord) -> Result<()> {
        down()
    }
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>> {
        down()
    }
    async fn rules_for_role(&self, _role: &str) -> Result<Vec<PermissionRule>> {
        down()
    }
    async fn list_rules(&self) -> Result<Vec<PermissionRule>> {
        down()
    }
    async fn put_rule(&self, _rule: &PermissionRule) -> Result<()> {
        down()
    }
    async fn delete_rule(&self, _role: &str, _topic_filter: &str) -> Result<bool> {
        down()
    }
    async fn get_retained(&self, _topic: &str) -> Result<Option<RetainedEntry>> {
        down()
    }
    async fn put_retained(&self, _entry: &RetainedEntry) -> Result<()> {
        down()
    }
    async fn delete_retained(&self, _topic: &str) -> Result<()> {
        down()
    }
    async fn list_retained(&self) -> Result<Vec<RetainedEntry>> {
        down()
    }
}

/// Every call hangs forever
pub(crate) struct StalledBackend;

async fn hang<T>() -> Result<T> {
    std::future::pending().await
}

#[async_trait]
impl StorageBackend for StalledBackend {
    async fn get_device(&self, _connection_id: &str) -> Result<Option<DeviceRecord>> {
        hang().await
    }
    async fn put_device(&self, _record: &DeviceRecord) -> Result<()> {
        hang().await
    }
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>> {
        hang().await
    }
    async fn rules_for_role(&self, _role: &str) -> Result<Vec<PermissionRule>> {
        hang().await
    }
    async fn list_rules(&self) -> Result<Vec<PermissionRule>> {
        hang().await
    }
    async fn put_rule(&self, _rule: &PermissionRule) -> Result<()> {
        hang().await
    }
    async fn delete_rule(&self, _role: &str, _topic_filter: &str) -> Result<bool> {
        hang().await
    }
    async fn get_retained(&self, _topic: &str) -> Result<Option<RetainedEntry>> {
        hang().await
    }
    async fn put_retained(&self, _entry: &RetainedEntry) -> Result<()> {
        hang().await
    }
    async fn delete_retained(&self, _topic: &str) -> Result<()> {
        hang().await
    }
    async fn list_retained(&self) -> Result<Vec<RetainedEntry>> {
        hang().await
    }
}
