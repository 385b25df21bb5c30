//! Access Gate
//!
//! The object the broker engine talks to. Composes the authenticator, the
//! device tracker, the rule resolver, the retained store and the topic
//! rewriter behind [`BrokerHooks`].
//!
//! Startup order: build the gate, call [`AccessGate::start`] (loads rules and
//! seeds the engine's retained cache), then let the engine accept clients.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::acl::RuleResolver;
use crate::auth::TokenAuthenticator;
use crate::config::{Config, ServicePolicy};
use crate::device::{DeviceTracker, DisconnectOutcome};
use crate::error::{GateError, GateResult};
use crate::hooks::{BrokerHooks, ClientRegistry, PublishGrant, RetainedCache};
use crate::retained::{RestoreReport, RetainedStore};
use crate::store::StorageBackend;
use crate::topic::{validate_topic_filter, validate_topic_name, TopicRewriter};
use crate::types::{Action, Principal, PrincipalKind, QoS};

#[cfg(test)]
mod tests;

/// Live connections sharing one connection id
struct LiveSession {
    kind: PrincipalKind,
    connections: usize,
}

/// Access gate
pub struct AccessGate {
    authenticator: TokenAuthenticator,
    tracker: Arc<DeviceTracker>,
    resolver: RuleResolver,
    retained: RetainedStore,
    rewriter: TopicRewriter,
    service_policy: ServicePolicy,
    /// Live connections by id, filled by `on_connect`
    sessions: DashMap<String, LiveSession>,
    /// Rejected attempts on ids with a live session, not yet closed
    rejected: DashMap<String, usize>,
}

impl AccessGate {
    /// Create a gate over `backend`. Rules are not loaded yet; every
    /// ACL-gated check denies until [`start`](Self::start) or
    /// [`reload_rules`](Self::reload_rules) succeeds.
    pub fn new(config: &Config, backend: Arc<dyn StorageBackend>) -> Self {
        let timeout = config.persistence.timeout;
        let tracker = Arc::new(DeviceTracker::new(backend.clone(), timeout));

        Self {
            authenticator: TokenAuthenticator::new(&config.auth, tracker.clone()),
            tracker,
            resolver: RuleResolver::new(backend.clone(), timeout),
            retained: RetainedStore::new(backend, timeout),
            rewriter: TopicRewriter::new(config.topics.reserved.clone()),
            service_policy: config.auth.service_policy,
            sessions: DashMap::new(),
            rejected: DashMap::new(),
        }
    }

    /// Load permission rules and seed the engine's retained cache.
    ///
    /// Must complete before the engine accepts connections.
    pub async fn start(&self, cache: &dyn RetainedCache) -> GateResult<RestoreReport> {
        self.reload_rules().await?;
        self.restore_retained(cache).await
    }

    /// Re-read permission rules from the store
    pub async fn reload_rules(&self) -> GateResult<usize> {
        self.resolver.reload().await
    }

    /// Hand every durable retained message to the engine
    pub async fn restore_retained(&self, cache: &dyn RetainedCache) -> GateResult<RestoreReport> {
        self.retained.restore_all(cache).await
    }

    /// Administratively disconnect a device.
    ///
    /// The record is marked `Disconnected` first so a reconnect racing the
    /// close is already rejected; then the engine is asked to drop the live
    /// connection. Returns `false` if the device is not provisioned.
    pub async fn disconnect_device(
        &self,
        registry: &dyn ClientRegistry,
        connection_id: &str,
    ) -> GateResult<bool> {
        if !self.tracker.force_disconnect(connection_id).await? {
            return Ok(false);
        }

        if registry.disconnect(connection_id).await {
            info!("Closed live connection of device {}", connection_id);
        } else {
            debug!("Device {} had no live connection", connection_id);
        }
        Ok(true)
    }

    pub fn tracker(&self) -> &DeviceTracker {
        &self.tracker
    }

    pub fn resolver(&self) -> &RuleResolver {
        &self.resolver
    }

    pub fn retained(&self) -> &RetainedStore {
        &self.retained
    }

    /// Number of connection ids with a live session
    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    /// Consume one pending rejected attempt for `connection_id`
    fn take_rejected(&self, connection_id: &str) -> bool {
        match self.rejected.entry(connection_id.to_string()) {
            Entry::Occupied(mut pending) => {
                *pending.get_mut() -= 1;
                if *pending.get() == 0 {
                    pending.remove();
                }
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Close one connection of `connection_id`. Returns the principal kind
    /// once the last live connection for the id is gone.
    fn end_session(&self, connection_id: &str) -> Option<PrincipalKind> {
        match self.sessions.entry(connection_id.to_string()) {
            Entry::Occupied(mut session) => {
                session.get_mut().connections -= 1;
                if session.get().connections == 0 {
                    Some(session.remove().kind)
                } else {
                    None
                }
            }
            Entry::Vacant(_) => None,
        }
    }

    /// ACL decision for principals that are not rewritten
    fn check(&self, principal: &Principal, topic: &str, action: Action) -> GateResult<()> {
        match principal.kind() {
            PrincipalKind::SuperUser => Ok(()),
            PrincipalKind::Service if self.service_policy == ServicePolicy::Trusted => Ok(()),
            PrincipalKind::Service | PrincipalKind::Device => {
                self.resolver.authorize(principal.role(), topic, action)
            }
        }
    }
}

#[async_trait]
impl BrokerHooks for AccessGate {
    async fn authenticate(
        &self,
        connection_id: &str,
        username: Option<&str>,
        credential: Option<&[u8]>,
    ) -> GateResult<Principal> {
        let result = self
            .authenticator
            .authenticate(connection_id, username, credential)
            .await;

        // The rejected client's close must not end the session already
        // holding this id
        if result.is_err() && self.sessions.contains_key(connection_id) {
            *self.rejected.entry(connection_id.to_string()).or_insert(0) += 1;
        }
        result
    }

    async fn authorize_subscribe(
        &self,
        principal: &Principal,
        filter: &str,
    ) -> GateResult<String> {
        if let Err(e) = validate_topic_filter(filter) {
            warn!(
                "Denying subscribe of {} to '{}': {}",
                principal.connection_id(),
                filter,
                e
            );
            return Err(GateError::PermissionDenied);
        }

        match self.check(principal, filter, Action::Subscribe) {
            Ok(()) => {
                debug!("{} subscribed to '{}'", principal.connection_id(), filter);
                Ok(filter.to_string())
            }
            Err(e) => {
                warn!(
                    "Denying subscribe of {} ({}, role {:?}) to '{}': {}",
                    principal.connection_id(),
                    principal.kind(),
                    principal.role(),
                    filter,
                    e
                );
                Err(e)
            }
        }
    }

    async fn authorize_publish(
        &self,
        principal: &Principal,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> GateResult<PublishGrant> {
        if let Err(e) = validate_topic_name(topic) {
            warn!(
                "Denying publish of {} to '{}': {}",
                principal.connection_id(),
                topic,
                e
            );
            return Err(GateError::PermissionDenied);
        }

        let target = match self.rewriter.rewrite(principal, topic)? {
            Some(scoped) => {
                info!(
                    "Rewrote publish of {} from '{}' to '{}'",
                    principal.connection_id(),
                    topic,
                    scoped
                );
                scoped
            }
            None => {
                if let Err(e) = self.check(principal, topic, Action::Publish) {
                    warn!(
                        "Denying publish of {} ({}, role {:?}) to '{}': {}",
                        principal.connection_id(),
                        principal.kind(),
                        principal.role(),
                        topic,
                        e
                    );
                    return Err(e);
                }
                topic.to_string()
            }
        };

        let retained = match self.retained.apply_publish(&target, payload, qos, retain).await {
            Ok(action) => action,
            Err(e) => {
                warn!(
                    "Denying retained publish of {} to '{}': {}",
                    principal.connection_id(),
                    target,
                    e
                );
                return Err(e);
            }
        };

        Ok(PublishGrant {
            topic: target,
            retained,
        })
    }

    async fn on_connect(&self, principal: &Principal) {
        let kind = principal.kind();
        self.sessions
            .entry(principal.connection_id().to_string())
            .and_modify(|session| {
                session.kind = kind;
                session.connections += 1;
            })
            .or_insert(LiveSession {
                kind,
                connections: 1,
            });
        info!(
            "Client connected: {} ({})",
            principal.connection_id(),
            principal.kind()
        );
    }

    async fn on_disconnect(&self, connection_id: &str) {
        if self.take_rejected(connection_id) {
            debug!("Rejected client {} closed", connection_id);
            return;
        }

        match self.end_session(connection_id) {
            Some(PrincipalKind::Device) => {}
            Some(kind) => {
                info!("Client disconnected: {} ({})", connection_id, kind);
                return;
            }
            None => {
                debug!("No session ended for {}", connection_id);
                return;
            }
        }
        info!("Client disconnected: {} (device)", connection_id);

        match self.tracker.mark_disconnected(connection_id).await {
            Ok(DisconnectOutcome::MarkedOffline) => {
                debug!("Device {} marked Offline", connection_id);
            }
            Ok(DisconnectOutcome::Unchanged(status)) => {
                debug!("Device {} stays {}", connection_id, status);
            }
            Ok(DisconnectOutcome::NotRegistered) => {}
            Err(e) => {
                warn!(
                    "Failed to record disconnect of {}: {}",
                    connection_id, e
                );
            }
        }
    }
}
