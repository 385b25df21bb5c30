//! Gate error taxonomy
//!
//! Every hook decision that is not an accept/allow is one of these. None of
//! them is retried internally; the broker engine decides what to do with the
//! connection.

use std::fmt;

use crate::store::PersistenceError;

/// Reasons an authenticate/authorize hook refuses a client event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// No bearer token in the password field
    NoCredential,
    /// Bad signature, malformed token or expired claims
    InvalidToken(String),
    /// Connection id has no provisioned device record
    UnknownDevice,
    /// Device was administratively disconnected
    DeviceDisconnected,
    /// Device was administratively deleted
    DeviceDeleted,
    /// No permission rule grants the requested action
    PermissionDenied,
    /// Backing store failed or timed out
    StoreUnavailable(String),
}

impl GateError {
    /// Whether this error came out of the authentication step
    pub fn is_auth_rejection(&self) -> bool {
        matches!(
            self,
            GateError::NoCredential
                | GateError::InvalidToken(_)
                | GateError::UnknownDevice
                | GateError::DeviceDisconnected
                | GateError::DeviceDeleted
        )
    }

    /// Short machine-friendly reason for audit logs
    pub fn reason(&self) -> &'static str {
        match self {
            GateError::NoCredential => "no_credential",
            GateError::InvalidToken(_) => "invalid_token",
            GateError::UnknownDevice => "unknown_device",
            GateError::DeviceDisconnected => "device_disconnected",
            GateError::DeviceDeleted => "device_deleted",
            GateError::PermissionDenied => "permission_denied",
            GateError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::NoCredential => write!(f, "No token provided"),
            GateError::InvalidToken(msg) => write!(f, "Invalid token: {}", msg),
            GateError::UnknownDevice => write!(f, "Unknown device"),
            GateError::DeviceDisconnected => write!(f, "Device is disconnected"),
            GateError::DeviceDeleted => write!(f, "Device is deleted"),
            GateError::PermissionDenied => write!(f, "Permission denied"),
            GateError::StoreUnavailable(msg) => write!(f, "Store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for GateError {}

impl From<PersistenceError> for GateError {
    fn from(err: PersistenceError) -> Self {
        GateError::StoreUnavailable(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for GateError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        GateError::InvalidToken(err.to_string())
    }
}

/// Gate result type
pub type GateResult<T> = Result<T, GateError>;
