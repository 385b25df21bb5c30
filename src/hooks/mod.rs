//! Hooks Module
//!
//! The seam between the gate and the broker engine. The engine calls into
//! [`BrokerHooks`] on every client event; the gate calls back into the
//! engine only through [`RetainedCache`] and [`ClientRegistry`], so it never
//! depends on engine internals and can be driven without a transport.

use std::fmt;

use async_trait::async_trait;

use crate::error::GateResult;
use crate::retained::RetainedAction;
use crate::store::RetainedEntry;
use crate::types::{Principal, QoS};


/// Errors reported by engine-side collaborators
#[derive(Debug)]
pub enum HookError {
    /// Internal error
    Internal(String),
    /// Collaborator is shutting down or not ready
    Unavailable,
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookError::Internal(msg) => write!(f, "Internal error: {}", msg),
            HookError::Unavailable => write!(f, "Collaborator unavailable"),
        }
    }
}

impl std::error::Error for HookError {}

/// Hook result type
pub type HookResult<T> = Result<T, HookError>;

/// An allowed publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishGrant {
    /// Topic the engine must deliver to; differs from the requested topic
    /// when the publish was rewritten
    pub topic: String,
    /// What happened to the retained store
    pub retained: RetainedAction,
}

impl PublishGrant {
    pub fn was_rewritten(&self, requested: &str) -> bool {
        self.topic != requested
    }
}

/// Broker hooks trait
///
/// Implemented by the gate, called by the broker engine. Calls for different
/// connections may run concurrently. An `Err` is a rejection: the engine
/// closes the connection on a failed `authenticate` and drops the packet on a
/// failed authorize.
#[async_trait]
pub trait BrokerHooks: Send + Sync {
    /// Called when a client attempts to authenticate
    ///
    /// # Arguments
    /// * `connection_id` - The client identifier
    /// * `username` - Optional username from CONNECT packet
    /// * `credential` - Optional password from CONNECT packet (bearer token)
    async fn authenticate(
        &self,
        connection_id: &str,
        username: Option<&str>,
        credential: Option<&[u8]>,
    ) -> GateResult<Principal>;

    /// Called when a client attempts to subscribe to a topic filter
    ///
    /// Returns the filter the engine should install.
    async fn authorize_subscribe(&self, principal: &Principal, filter: &str)
        -> GateResult<String>;

    /// Called when a client attempts to publish a message
    ///
    /// Retained-store side effects are applied before this returns `Ok`.
    async fn authorize_publish(
        &self,
        principal: &Principal,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> GateResult<PublishGrant>;

    /// Called after a client successfully connects
    async fn on_connect(&self, principal: &Principal);

    /// Called when a client's transport closes.
    ///
    /// Called once for every connection that reached `authenticate`,
    /// whether it was accepted or not.
    async fn on_disconnect(&self, connection_id: &str);
}

/// Implement BrokerHooks for Arc<T> where T: BrokerHooks
/// This allows Arc-wrapped gates to be handed to the engine directly
#[async_trait]
impl<T: BrokerHooks + ?Sized> BrokerHooks for std::sync::Arc<T> {
    async fn authenticate(
        &self,
        connection_id: &str,
        username: Option<&str>,
        credential: Option<&[u8]>,
    ) -> GateResult<Principal> {
        (**self)
            .authenticate(connection_id, username, credential)
            .await
    }

    async fn authorize_subscribe(
        &self,
        principal: &Principal,
        filter: &str,
    ) -> GateResult<String> {
        (**self).authorize_subscribe(principal, filter).await
    }

    async fn authorize_publish(
        &self,
        principal: &Principal,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> GateResult<PublishGrant> {
        (**self)
            .authorize_publish(principal, topic, payload, qos, retain)
            .await
    }

    async fn on_connect(&self, principal: &Principal) {
        (**self).on_connect(principal).await;
    }

    async fn on_disconnect(&self, connection_id: &str) {
        (**self).on_disconnect(connection_id).await;
    }
}

/// The engine's in-memory retained-message cache
#[async_trait]
pub trait RetainedCache: Send + Sync {
    /// Seed one retained message
    async fn load_retained(&self, entry: RetainedEntry) -> HookResult<()>;
}

/// The engine's registry of live connections
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Close the connection with this id. Returns `false` if it is not
    /// connected.
    async fn disconnect(&self, connection_id: &str) -> bool;
}
