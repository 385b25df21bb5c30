//! Store error types.

use std::fmt;

/// Ways a store call can fail. The gate turns every one of them into
/// `StoreUnavailable` and fails closed.
#[derive(Debug)]
pub enum PersistenceError {
    /// The backend could not be reached or rejected the operation
    Backend(String),
    /// A record could not be encoded for writing
    Encode(String),
    /// A stored row could not be decoded
    Decode(String),
    /// A key component contains the reserved separator byte
    InvalidKey(String),
    /// Operation did not finish within the configured bound
    Timeout,
}

impl PersistenceError {
    /// True when the store did not answer in time
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend(e) => write!(f, "backend error: {}", e),
            Self::Encode(e) => write!(f, "encode error: {}", e),
            Self::Decode(e) => write!(f, "decode error: {}", e),
            Self::InvalidKey(e) => write!(f, "invalid key: {}", e),
            Self::Timeout => write!(f, "storage operation timed out"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<fjall::Error> for PersistenceError {
    fn from(err: fjall::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for PersistenceError {
    fn from(err: bincode::error::EncodeError) -> Self {
        Self::Encode(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for PersistenceError {
    fn from(err: bincode::error::DecodeError) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for PersistenceError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
