//! Reserved-topic rewriting
//!
//! Publishes to the reserved broadcast topic (an emergency stop) are scoped
//! to the publisher: `<reserved>/<subject id or connection id>`. One device
//! therefore can never stop another device through that topic, and no ACL
//! rule has to be written per device for it.

use tracing::warn;

use super::validation::validate_topic_name;
use crate::error::{GateError, GateResult};
use crate::types::Principal;

/// Rewrites publishes to one reserved topic name
#[derive(Debug, Clone)]
pub struct TopicRewriter {
    reserved: String,
}

/// A scope has to be exactly one plain topic level
fn is_valid_scope(scope: &str) -> bool {
    !scope.is_empty() && !scope.contains(|c| matches!(c, '/' | '+' | '#' | '\0'))
}

impl TopicRewriter {
    pub fn new(reserved: impl Into<String>) -> Self {
        Self {
            reserved: reserved.into(),
        }
    }

    /// The reserved topic name
    pub fn reserved(&self) -> &str {
        &self.reserved
    }

    /// Scoped topic for `topic`, or `Ok(None)` when it is not the reserved
    /// name.
    ///
    /// Only the exact reserved name is rewritten, so an already-scoped topic
    /// passes through unchanged and a publish is rewritten at most once.
    /// A subject id that is not a single plain level falls back to the
    /// connection id; if neither is usable the publish is denied.
    pub fn rewrite(&self, principal: &Principal, topic: &str) -> GateResult<Option<String>> {
        if topic != self.reserved {
            return Ok(None);
        }

        let scope = match principal.subject_id() {
            Some(subject) if is_valid_scope(subject) => subject,
            _ => principal.connection_id(),
        };
        if !is_valid_scope(scope) {
            warn!(
                "Cannot scope '{}' for {}: no usable subject or connection id",
                topic,
                principal.connection_id()
            );
            return Err(GateError::PermissionDenied);
        }

        let scoped = format!("{}/{}", self.reserved, scope);
        if let Err(e) = validate_topic_name(&scoped) {
            warn!("Rewritten topic '{}' is invalid: {}", scoped, e);
            return Err(GateError::PermissionDenied);
        }
        Ok(Some(scoped))
    }
}
