//! Authentication Module
//!
//! Verifies the bearer token a client sends in the CONNECT password field
//! and classifies the connection:
//! - the configured super-user name connects without a token
//! - tokens with `"type": "Service"` become service principals
//! - everything else is a device and must have an admissible device record

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{de, Deserialize, Deserializer};
use tracing::{info, warn};

use crate::config::{AuthConfig, MAX_TOKEN_LEEWAY};
use crate::device::DeviceTracker;
use crate::error::{GateError, GateResult};
use crate::types::Principal;


/// Claim value marking a backend service token
const SERVICE_TYPE: &str = "Service";

/// Claims the gate reads from a token. Unknown claims are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Claims {
    /// Principal type, `"Service"` for backend services
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// ACL role
    #[serde(default)]
    pub role: Option<String>,
    /// Subject id; issued as a string or a number
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    /// Display name, only logged
    #[serde(default)]
    pub username: Option<String>,
}

impl Claims {
    pub fn is_service(&self) -> bool {
        self.kind.as_deref() == Some(SERVICE_TYPE)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "id claim must be a string or number, got {}",
            other
        ))),
    }
}

/// Token authenticator
pub struct TokenAuthenticator {
    super_username: String,
    key: DecodingKey,
    validation: Validation,
    tracker: Arc<DeviceTracker>,
}

impl TokenAuthenticator {
    /// Create a new authenticator from configuration
    pub fn new(config: &AuthConfig, tracker: Arc<DeviceTracker>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        // exp is checked when present but not required
        validation.required_spec_claims.clear();
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = config.token_leeway.min(MAX_TOKEN_LEEWAY).as_secs();

        Self {
            super_username: config.super_username.clone(),
            key: DecodingKey::from_secret(config.token_secret.as_bytes()),
            validation,
            tracker,
        }
    }

    /// Verify a raw credential and return its claims
    pub fn verify(&self, credential: &[u8]) -> GateResult<Claims> {
        let token = std::str::from_utf8(credential)
            .map_err(|_| GateError::InvalidToken("token is not valid UTF-8".to_string()))?;
        let data = jsonwebtoken::decode::<Claims>(token.trim(), &self.key, &self.validation)?;
        Ok(data.claims)
    }

    /// Authenticate one connection attempt.
    ///
    /// Only the device branch touches the store, and only after the token
    /// verified; every rejection leaves stored state unchanged.
    pub async fn authenticate(
        &self,
        connection_id: &str,
        username: Option<&str>,
        credential: Option<&[u8]>,
    ) -> GateResult<Principal> {
        if username == Some(self.super_username.as_str()) {
            info!("Super-user connected: {}", connection_id);
            return Ok(Principal::super_user(connection_id));
        }

        let credential = match credential {
            Some(c) if !c.is_empty() => c,
            _ => {
                warn!("Rejecting {}: no token provided", connection_id);
                return Err(GateError::NoCredential);
            }
        };

        let claims = match self.verify(credential) {
            Ok(claims) => claims,
            Err(e) => {
                warn!("Rejecting {}: {}", connection_id, e);
                return Err(e);
            }
        };

        if claims.is_service() {
            info!(
                "Service authenticated: {} (role {:?})",
                connection_id, claims.role
            );
            return Ok(Principal::service(connection_id, claims.role));
        }

        match self.tracker.mark_connected(connection_id).await {
            Ok(record) => {
                info!(
                    "Device authenticated: {} (device {}, user {:?}, role {:?})",
                    connection_id, record.device_id, claims.username, claims.role
                );
                Ok(Principal::device(connection_id, claims.role, claims.id))
            }
            Err(e) => {
                warn!("Rejecting device {}: {}", connection_id, e);
                Err(e)
            }
        }
    }
}
