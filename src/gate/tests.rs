//! Gate tests

use super::*;
use crate::hooks::{HookResult, RetainedCache};
use crate::retained::RetainedAction;
use crate::store::testing::UnavailableBackend;
use crate::store::{DeviceRecord, DeviceStatus, MemoryBackend, PermissionRule, RetainedEntry};
use crate::types::RuleAction;
use jsonwebtoken::{encode, EncodingKey, Header};
use parking_lot::Mutex;
use serde_json::json;

const SECRET: &str = "gate-secret";

fn make_config(policy: ServicePolicy) -> Config {
    let mut config = Config::default();
    config.auth.token_secret = SECRET.to_string();
    config.auth.service_policy = policy;
    config
}

fn token(claims: serde_json::Value) -> Vec<u8> {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
    .into_bytes()
}

#[derive(Default)]
struct NullCache {
    count: Mutex<usize>,
}

#[async_trait]
impl RetainedCache for NullCache {
    async fn load_retained(&self, _entry: RetainedEntry) -> HookResult<()> {
        *self.count.lock() += 1;
        Ok(())
    }
}

#[derive(Default)]
struct FakeRegistry {
    live: Mutex<Vec<String>>,
}

#[async_trait]
impl ClientRegistry for FakeRegistry {
    async fn disconnect(&self, connection_id: &str) -> bool {
        let mut live = self.live.lock();
        let before = live.len();
        live.retain(|id| id != connection_id);
        live.len() != before
    }
}

async fn make_gate(policy: ServicePolicy) -> (AccessGate, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .put_device(&DeviceRecord::new("dev-1", "thermo-1"))
        .await
        .unwrap();
    for rule in [
        PermissionRule::new("sensor", "telemetry/+", RuleAction::Publish),
        PermissionRule::new("sensor", "commands/#", RuleAction::Subscribe),
        PermissionRule::new("backend", "telemetry/#", RuleAction::Subscribe),
    ] {
        backend.put_rule(&rule).await.unwrap();
    }

    let gate = AccessGate::new(&make_config(policy), backend.clone());
    gate.start(&NullCache::default()).await.unwrap();
    (gate, backend)
}

fn sensor() -> Principal {
    Principal::device("dev-1", Some("sensor".to_string()), Some("u42".to_string()))
}

#[tokio::test]
async fn test_device_publish_follows_rules() {
    let (gate, _) = make_gate(ServicePolicy::Rules).await;
    let principal = sensor();

    let grant = gate
        .authorize_publish(&principal, "telemetry/temp", b"21", QoS::AtMostOnce, false)
        .await
        .unwrap();
    assert_eq!(grant.topic, "telemetry/temp");
    assert_eq!(grant.retained, RetainedAction::Ignored);

    assert_eq!(
        gate.authorize_publish(&principal, "telemetry/temp/extra", b"21", QoS::AtMostOnce, false)
            .await,
        Err(GateError::PermissionDenied)
    );
    assert_eq!(
        gate.authorize_publish(&principal, "control/reset", b"1", QoS::AtMostOnce, false)
            .await,
        Err(GateError::PermissionDenied)
    );
}

#[tokio::test]
async fn test_reserved_topic_rewritten_and_allowed() {
    let (gate, _) = make_gate(ServicePolicy::Rules).await;

    // No rule grants "emergency_stop" to sensor
    let grant = gate
        .authorize_publish(&sensor(), "emergency_stop", b"1", QoS::AtLeastOnce, false)
        .await
        .unwrap();
    assert_eq!(grant.topic, "emergency_stop/u42");
    assert!(grant.was_rewritten("emergency_stop"));

    // Without a subject id the connection id scopes the topic
    let anonymous = Principal::device("dev-9", None, None);
    let grant = gate
        .authorize_publish(&anonymous, "emergency_stop", b"1", QoS::AtMostOnce, false)
        .await
        .unwrap();
    assert_eq!(grant.topic, "emergency_stop/dev-9");

    // Already scoped topics go through the rules like any other
    assert_eq!(
        gate.authorize_publish(&sensor(), "emergency_stop/other", b"1", QoS::AtMostOnce, false)
            .await,
        Err(GateError::PermissionDenied)
    );
}

#[tokio::test]
async fn test_retained_publish_is_stored_under_delivered_topic() {
    let (gate, _) = make_gate(ServicePolicy::Rules).await;

    let grant = gate
        .authorize_publish(&sensor(), "emergency_stop", b"halt", QoS::AtLeastOnce, true)
        .await
        .unwrap();
    assert_eq!(grant.retained, RetainedAction::Stored);
    assert!(gate
        .retained()
        .get("emergency_stop/u42")
        .await
        .unwrap()
        .is_some());
    assert!(gate.retained().get("emergency_stop").await.unwrap().is_none());

    let grant = gate
        .authorize_publish(&sensor(), "emergency_stop", b"", QoS::AtMostOnce, true)
        .await
        .unwrap();
    assert_eq!(grant.retained, RetainedAction::Cleared);
    assert!(gate.retained().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_denied_publish_does_not_touch_retained() {
    let (gate, _) = make_gate(ServicePolicy::Rules).await;

    assert!(gate
        .authorize_publish(&sensor(), "control/reset", b"1", QoS::AtMostOnce, true)
        .await
        .is_err());
    assert!(gate.retained().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_super_user_bypasses_rules() {
    let (gate, _) = make_gate(ServicePolicy::Rules).await;
    let admin = gate.authenticate("console", Some("super"), None).await.unwrap();

    assert_eq!(gate.authorize_subscribe(&admin, "#").await.unwrap(), "#");
    let grant = gate
        .authorize_publish(&admin, "control/reset", b"1", QoS::AtMostOnce, false)
        .await
        .unwrap();
    assert_eq!(grant.topic, "control/reset");
}

#[tokio::test]
async fn test_service_policy() {
    let svc = token(json!({ "type": "Service", "role": "backend" }));

    let (gate, _) = make_gate(ServicePolicy::Rules).await;
    let principal = gate.authenticate("svc", Some("api"), Some(&svc)).await.unwrap();
    assert!(gate.authorize_subscribe(&principal, "telemetry/+").await.is_ok());
    assert_eq!(
        gate.authorize_subscribe(&principal, "commands/#").await,
        Err(GateError::PermissionDenied)
    );

    let (gate, _) = make_gate(ServicePolicy::Trusted).await;
    let principal = gate.authenticate("svc", Some("api"), Some(&svc)).await.unwrap();
    assert!(gate.authorize_subscribe(&principal, "commands/#").await.is_ok());
    assert!(gate
        .authorize_publish(&principal, "control/reset", b"1", QoS::AtMostOnce, false)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_invalid_topics_denied() {
    let (gate, _) = make_gate(ServicePolicy::Rules).await;
    let admin = Principal::super_user("console");

    assert_eq!(
        gate.authorize_subscribe(&admin, "a/#/b").await,
        Err(GateError::PermissionDenied)
    );
    assert_eq!(
        gate.authorize_publish(&admin, "a/+", b"1", QoS::AtMostOnce, false)
            .await,
        Err(GateError::PermissionDenied)
    );
}

#[tokio::test]
async fn test_lifecycle_tracks_device_status() {
    let (gate, backend) = make_gate(ServicePolicy::Rules).await;
    let jwt = token(json!({ "role": "sensor", "id": "u42" }));

    let principal = gate
        .authenticate("dev-1", Some("thermo"), Some(&jwt))
        .await
        .unwrap();
    gate.on_connect(&principal).await;
    assert_eq!(gate.connection_count(), 1);
    assert_eq!(
        backend.get_device("dev-1").await.unwrap().unwrap().status,
        DeviceStatus::Online
    );

    gate.on_disconnect("dev-1").await;
    assert_eq!(gate.connection_count(), 0);
    assert_eq!(
        backend.get_device("dev-1").await.unwrap().unwrap().status,
        DeviceStatus::Offline
    );
}

#[tokio::test]
async fn test_disconnect_device_is_sticky() {
    let (gate, backend) = make_gate(ServicePolicy::Rules).await;
    let registry = FakeRegistry::default();
    registry.live.lock().push("dev-1".to_string());

    assert!(gate.disconnect_device(&registry, "dev-1").await.unwrap());
    assert!(registry.live.lock().is_empty());

    // The engine reports the close afterwards; status must stay Disconnected
    gate.on_disconnect("dev-1").await;
    assert_eq!(
        backend.get_device("dev-1").await.unwrap().unwrap().status,
        DeviceStatus::Disconnected
    );

    let jwt = token(json!({ "role": "sensor" }));
    assert_eq!(
        gate.authenticate("dev-1", None, Some(&jwt)).await,
        Err(GateError::DeviceDisconnected)
    );

    assert!(!gate.disconnect_device(&registry, "ghost").await.unwrap());
}

#[tokio::test]
async fn test_unavailable_store_fails_closed() {
    let gate = AccessGate::new(
        &make_config(ServicePolicy::Rules),
        Arc::new(UnavailableBackend),
    );

    assert!(gate.start(&NullCache::default()).await.is_err());

    let result = gate
        .authorize_publish(&sensor(), "telemetry/temp", b"1", QoS::AtMostOnce, false)
        .await;
    assert!(matches!(result, Err(GateError::StoreUnavailable(_))));

    // Rewritten publishes skip the rules but still need the retained store
    let result = gate
        .authorize_publish(&sensor(), "emergency_stop", b"1", QoS::AtMostOnce, true)
        .await;
    assert!(matches!(result, Err(GateError::StoreUnavailable(_))));

    let jwt = token(json!({ "role": "sensor" }));
    let result = gate.authenticate("dev-1", None, Some(&jwt)).await;
    assert!(matches!(result, Err(GateError::StoreUnavailable(_))));

    // Disconnect bookkeeping errors are swallowed
    gate.on_disconnect("dev-1").await;
}

#[tokio::test]
async fn test_rejected_client_reusing_live_id_keeps_device_online() {
    let (gate, backend) = make_gate(ServicePolicy::Rules).await;
    let jwt = token(json!({ "role": "sensor" }));

    let principal = gate.authenticate("dev-1", None, Some(&jwt)).await.unwrap();
    gate.on_connect(&principal).await;

    // Second client with the same id and a bad token, then its close
    assert!(matches!(
        gate.authenticate("dev-1", None, Some(b"garbage")).await,
        Err(GateError::InvalidToken(_))
    ));
    gate.on_disconnect("dev-1").await;

    assert_eq!(
        backend.get_device("dev-1").await.unwrap().unwrap().status,
        DeviceStatus::Online
    );
    assert_eq!(gate.connection_count(), 1);

    // The real session's close still marks it Offline
    gate.on_disconnect("dev-1").await;
    assert_eq!(
        backend.get_device("dev-1").await.unwrap().unwrap().status,
        DeviceStatus::Offline
    );
}

#[tokio::test]
async fn test_disconnect_without_session_leaves_status() {
    let (gate, backend) = make_gate(ServicePolicy::Rules).await;
    backend
        .put_device(&{
            let mut record = DeviceRecord::new("dev-2", "thermo-2");
            record.status = DeviceStatus::Online;
            record
        })
        .await
        .unwrap();

    gate.on_disconnect("dev-2").await;
    assert_eq!(
        backend.get_device("dev-2").await.unwrap().unwrap().status,
        DeviceStatus::Online
    );
}

#[tokio::test]
async fn test_takeover_keeps_device_online_until_last_close() {
    let (gate, backend) = make_gate(ServicePolicy::Rules).await;
    let jwt = token(json!({ "role": "sensor" }));

    for _ in 0..2 {
        let principal = gate.authenticate("dev-1", None, Some(&jwt)).await.unwrap();
        gate.on_connect(&principal).await;
    }

    gate.on_disconnect("dev-1").await;
    assert_eq!(
        backend.get_device("dev-1").await.unwrap().unwrap().status,
        DeviceStatus::Online
    );

    gate.on_disconnect("dev-1").await;
    assert_eq!(
        backend.get_device("dev-1").await.unwrap().unwrap().status,
        DeviceStatus::Offline
    );
}

#[tokio::test]
async fn test_reserved_topic_never_rewritten_to_wildcard() {
    let (gate, _) = make_gate(ServicePolicy::Rules).await;

    let principal = Principal::device("dev-1", Some("sensor".to_string()), Some("#".to_string()));
    let grant = gate
        .authorize_publish(&principal, "emergency_stop", b"1", QoS::AtMostOnce, false)
        .await
        .unwrap();
    assert_eq!(grant.topic, "emergency_stop/dev-1");
    assert!(validate_topic_name(&grant.topic).is_ok());

    let unscopable = Principal::device("a/+", None, Some("x/y".to_string()));
    assert_eq!(
        gate.authorize_publish(&unscopable, "emergency_stop", b"1", QoS::AtMostOnce, true)
            .await,
        Err(GateError::PermissionDenied)
    );
    assert!(gate.retained().list().await.unwrap().is_empty());
}
