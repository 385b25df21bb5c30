//! Shared types passed between the gate and the broker engine

use std::fmt;

use bincode::{Decode, Encode};

/// MQTT QoS level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum QoS {
    /// At most once delivery
    #[default]
    AtMostOnce = 0,
    /// At least once delivery
    AtLeastOnce = 1,
    /// Exactly once delivery
    ExactlyOnce = 2,
}

impl QoS {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Client action being authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Publish,
    Subscribe,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Publish => write!(f, "publish"),
            Action::Subscribe => write!(f, "subscribe"),
        }
    }
}

/// Action a permission rule grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum RuleAction {
    Publish,
    Subscribe,
    /// Counts for both directions
    PublishAndSubscribe,
}

impl RuleAction {
    /// Whether a rule with this action applies to the requested action
    pub fn permits(self, action: Action) -> bool {
        matches!(
            (self, action),
            (RuleAction::PublishAndSubscribe, _)
                | (RuleAction::Publish, Action::Publish)
                | (RuleAction::Subscribe, Action::Subscribe)
        )
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Publish => write!(f, "publish"),
            RuleAction::Subscribe => write!(f, "subscribe"),
            RuleAction::PublishAndSubscribe => write!(f, "publish+subscribe"),
        }
    }
}

/// How a connection was classified at authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrincipalKind {
    /// Bypasses every ACL check
    SuperUser,
    /// Backend service, not tracked as a device
    Service,
    /// Registered device, gated by its device record
    Device,
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrincipalKind::SuperUser => write!(f, "super-user"),
            PrincipalKind::Service => write!(f, "service"),
            PrincipalKind::Device => write!(f, "device"),
        }
    }
}

/// Resolved identity of one connection.
///
/// Built once by the authenticator and never mutated afterwards; the engine
/// hands it back on every authorize call for that connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    connection_id: String,
    kind: PrincipalKind,
    role: Option<String>,
    subject_id: Option<String>,
}

impl Principal {
    pub fn super_user(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            kind: PrincipalKind::SuperUser,
            role: None,
            subject_id: None,
        }
    }

    pub fn service(connection_id: impl Into<String>, role: Option<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            kind: PrincipalKind::Service,
            role,
            subject_id: None,
        }
    }

    pub fn device(
        connection_id: impl Into<String>,
        role: Option<String>,
        subject_id: Option<String>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            kind: PrincipalKind::Device,
            role,
            subject_id,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn kind(&self) -> PrincipalKind {
        self.kind
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.subject_id.as_deref()
    }

    pub fn is_super(&self) -> bool {
        self.kind == PrincipalKind::SuperUser
    }
}
