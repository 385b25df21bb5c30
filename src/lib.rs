//! MqGate - Topic access control and retained state for MQTT brokers
//!
//! Plugs into a broker engine through the [`BrokerHooks`] trait and decides
//! who may connect, publish and subscribe. Owns the durable retained message
//! per topic and the durable connectivity status of each registered device.

pub mod acl;
pub mod auth;
pub mod config;
pub mod device;
pub mod error;
pub mod gate;
pub mod hooks;
pub mod retained;
pub mod store;
pub mod topic;
pub mod types;

pub use acl::{RuleResolver, RuleSet};
pub use auth::{Claims, TokenAuthenticator};
pub use config::Config;
pub use device::{DeviceTracker, DisconnectOutcome};
pub use error::{GateError, GateResult};
pub use gate::AccessGate;
pub use hooks::{BrokerHooks, ClientRegistry, HookError, PublishGrant, RetainedCache};
pub use retained::{RestoreReport, RetainedAction, RetainedStore};
pub use store::{
    open_backend, DeviceRecord, DeviceStatus, FjallBackend, MemoryBackend, PermissionRule,
    RetainedEntry, StorageBackend,
};
pub use topic::TopicRewriter;
pub use types::{Action, Principal, PrincipalKind, QoS, RuleAction};
