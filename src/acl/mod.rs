//! ACL (Access Control List) Module
//!
//! Resolves (role, topic, action) against role-scoped permission rules:
//! - MQTT wildcards (# and +) in rule filters
//! - `PublishAndSubscribe` rules count for both directions
//! - Unknown roles and missing roles are denied
//!
//! Rules live in the durable store and change rarely. The resolver keeps an
//! immutable snapshot of them; checks clone the snapshot `Arc` under a
//! short read lock and never touch the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{GateError, GateResult};
use crate::store::{bounded, PermissionRule, StorageBackend};
use crate::topic::{filter_covers, topic_matches_filter, validate_topic_filter};
use crate::types::{Action, RuleAction};


/// Rule with a filter that passed validation
#[derive(Debug, Clone)]
struct CompiledRule {
    filter: String,
    action: RuleAction,
}

impl CompiledRule {
    fn allows(&self, topic: &str, action: Action) -> bool {
        if !self.action.permits(action) {
            return false;
        }
        match action {
            Action::Publish => topic_matches_filter(topic, &self.filter),
            // Subscribers send filters, the rule has to cover all of it
            Action::Subscribe => filter_covers(&self.filter, topic),
        }
    }
}

/// Immutable view of all permission rules, grouped by role
#[derive(Debug, Default)]
pub struct RuleSet {
    roles: HashMap<String, Vec<CompiledRule>>,
}

impl RuleSet {
    /// Build a rule set, dropping rules whose filter is not a valid topic filter
    pub fn from_rules<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = PermissionRule>,
    {
        let mut roles: HashMap<String, Vec<CompiledRule>> = HashMap::new();

        for rule in rules {
            if let Err(e) = validate_topic_filter(&rule.topic_filter) {
                warn!(
                    "Ignoring rule '{}' for role '{}': {}",
                    rule.topic_filter, rule.role, e
                );
                continue;
            }
            roles.entry(rule.role).or_default().push(CompiledRule {
                filter: rule.topic_filter,
                action: rule.action,
            });
        }

        Self { roles }
    }

    /// Number of usable rules
    pub fn len(&self) -> usize {
        self.roles.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Whether any rule of `role` allows `action` on `topic`
    pub fn allows(&self, role: &str, topic: &str, action: Action) -> bool {
        self.roles
            .get(role)
            .is_some_and(|rules| rules.iter().any(|r| r.allows(topic, action)))
    }
}

/// Permission rule resolver
pub struct RuleResolver {
    backend: Arc<dyn StorageBackend>,
    timeout: Duration,
    /// `None` until rules were loaded once; checks deny meanwhile
    snapshot: RwLock<Option<Arc<RuleSet>>>,
}

impl RuleResolver {
    /// Create a resolver with no rules loaded. Call [`reload`](Self::reload)
    /// before use; until then every check is denied.
    pub fn new(backend: Arc<dyn StorageBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            snapshot: RwLock::new(None),
        }
    }

    /// Re-read all rules from the store and swap the snapshot.
    ///
    /// On failure the previous snapshot (if any) stays in place.
    pub async fn reload(&self) -> GateResult<usize> {
        let rules = bounded(self.timeout, self.backend.list_rules()).await?;
        let set = RuleSet::from_rules(rules);
        let count = set.len();

        *self.snapshot.write() = Some(Arc::new(set));
        info!("Loaded {} permission rules", count);
        Ok(count)
    }

    /// Current snapshot, if rules were loaded
    pub fn snapshot(&self) -> Option<Arc<RuleSet>> {
        self.snapshot.read().clone()
    }

    /// Decide whether `role` may perform `action` on `topic`.
    ///
    /// For subscribe, `topic` is the requested topic filter.
    pub fn authorize(&self, role: Option<&str>, topic: &str, action: Action) -> GateResult<()> {
        let Some(rules) = self.snapshot() else {
            warn!(
                "Denying {} on '{}': permission rules not loaded",
                action, topic
            );
            return Err(GateError::StoreUnavailable(
                "permission rules not loaded".to_string(),
            ));
        };

        let Some(role) = role else {
            debug!("Denying {} on '{}': no role", action, topic);
            return Err(GateError::PermissionDenied);
        };

        if rules.allows(role, topic, action) {
            debug!("Allowing {} on '{}' for role '{}'", action, topic, role);
            Ok(())
        } else {
            debug!("Denying {} on '{}' for role '{}'", action, topic, role);
            Err(GateError::PermissionDenied)
        }
    }
}
