//! Durable records for the three gate tables.
//!
//! Values are serialized with bincode; keys are the plain identifiers.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use bincode::{Decode, Encode};

use crate::types::{QoS, RuleAction};

/// Connectivity status of a provisioned device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum DeviceStatus {
    Online,
    Offline,
    /// Set by an administrator; sticky
    Disconnected,
    /// Set by an administrator; sticky
    Deleted,
}

impl DeviceStatus {
    /// Terminal from the hook path's point of view
    pub fn is_sticky(self) -> bool {
        matches!(self, DeviceStatus::Disconnected | DeviceStatus::Deleted)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceStatus::Online => "Online",
            DeviceStatus::Offline => "Offline",
            DeviceStatus::Disconnected => "Disconnected",
            DeviceStatus::Deleted => "Deleted",
        };
        f.write_str(s)
    }
}

impl FromStr for DeviceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "online" => Ok(DeviceStatus::Online),
            "offline" => Ok(DeviceStatus::Offline),
            "disconnected" => Ok(DeviceStatus::Disconnected),
            "deleted" => Ok(DeviceStatus::Deleted),
            other => Err(format!("unknown device status '{}'", other)),
        }
    }
}

/// Stored device record, keyed by connection id
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct DeviceRecord {
    /// Stable MQTT client identifier
    pub connection_id: String,
    pub device_id: String,
    pub status: DeviceStatus,
    /// Unix timestamp in seconds of the last status change
    pub last_seen_secs: u64,
}

impl DeviceRecord {
    pub fn new(connection_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            device_id: device_id.into(),
            status: DeviceStatus::Offline,
            last_seen_secs: now_unix_secs(),
        }
    }

    /// Move to `status` and stamp `last_seen`
    pub fn transition(&mut self, status: DeviceStatus) {
        self.status = status;
        self.last_seen_secs = now_unix_secs();
    }
}

/// Stored permission rule, keyed by (role, topic filter)
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct PermissionRule {
    pub role: String,
    pub topic_filter: String,
    pub action: RuleAction,
}

impl PermissionRule {
    pub fn new(
        role: impl Into<String>,
        topic_filter: impl Into<String>,
        action: RuleAction,
    ) -> Self {
        Self {
            role: role.into(),
            topic_filter: topic_filter.into(),
            action,
        }
    }
}

/// Stored retained message, keyed by topic
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct RetainedEntry {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    /// Unix timestamp in seconds when the message was stored
    pub updated_at_secs: u64,
}

impl RetainedEntry {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: qos.as_u8(),
            updated_at_secs: now_unix_secs(),
        }
    }

    /// Stored QoS, clamped to a valid level
    pub fn qos(&self) -> QoS {
        QoS::from_u8(self.qos).unwrap_or(QoS::ExactlyOnce)
    }
}

pub(crate) fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
