//! Device tracker tests

use super::*;
use crate::store::testing::{StalledBackend, UnavailableBackend};
use crate::store::MemoryBackend;

const TIMEOUT: Duration = Duration::from_secs(1);

async fn tracker_with(records: &[(&str, DeviceStatus)]) -> (DeviceTracker, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    for (id, status) in records {
        let mut record = DeviceRecord::new(*id, format!("dev-{}", id));
        record.status = *status;
        backend.put_device(&record).await.unwrap();
    }
    (DeviceTracker::new(backend.clone(), TIMEOUT), backend)
}

async fn status_of(backend: &MemoryBackend, id: &str) -> DeviceStatus {
    backend.get_device(id).await.unwrap().unwrap().status
}

#[tokio::test]
async fn test_connect_marks_online() {
    let (tracker, backend) = tracker_with(&[("c1", DeviceStatus::Offline)]).await;

    let record = tracker.mark_connected("c1").await.unwrap();
    assert_eq!(record.status, DeviceStatus::Online);
    assert_eq!(record.device_id, "dev-c1");
    assert_eq!(status_of(&backend, "c1").await, DeviceStatus::Online);
}

#[tokio::test]
async fn test_connect_unknown_device_rejected() {
    let (tracker, backend) = tracker_with(&[]).await;

    let err = tracker.mark_connected("ghost").await.unwrap_err();
    assert_eq!(err, GateError::UnknownDevice);
    assert!(backend.get_device("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn test_connect_sticky_statuses_rejected_without_write() {
    let (tracker, backend) = tracker_with(&[
        ("gone", DeviceStatus::Deleted),
        ("kicked", DeviceStatus::Disconnected),
    ])
    .await;
    let before = backend.get_device("gone").await.unwrap().unwrap();

    assert_eq!(
        tracker.mark_connected("gone").await.unwrap_err(),
        GateError::DeviceDeleted
    );
    assert_eq!(
        tracker.mark_connected("kicked").await.unwrap_err(),
        GateError::DeviceDisconnected
    );

    // Untouched, including last_seen
    assert_eq!(backend.get_device("gone").await.unwrap().unwrap(), before);
    assert_eq!(status_of(&backend, "kicked").await, DeviceStatus::Disconnected);
}

#[tokio::test]
async fn test_disconnect_online_goes_offline() {
    let (tracker, backend) = tracker_with(&[("c1", DeviceStatus::Online)]).await;

    let outcome = tracker.mark_disconnected("c1").await.unwrap();
    assert_eq!(outcome, DisconnectOutcome::MarkedOffline);
    assert_eq!(status_of(&backend, "c1").await, DeviceStatus::Offline);
}

#[tokio::test]
async fn test_disconnect_keeps_sticky_status() {
    let (tracker, backend) = tracker_with(&[
        ("kicked", DeviceStatus::Disconnected),
        ("gone", DeviceStatus::Deleted),
    ])
    .await;

    assert_eq!(
        tracker.mark_disconnected("kicked").await.unwrap(),
        DisconnectOutcome::Unchanged(DeviceStatus::Disconnected)
    );
    assert_eq!(
        tracker.mark_disconnected("gone").await.unwrap(),
        DisconnectOutcome::Unchanged(DeviceStatus::Deleted)
    );
    assert_eq!(status_of(&backend, "kicked").await, DeviceStatus::Disconnected);
    assert_eq!(status_of(&backend, "gone").await, DeviceStatus::Deleted);
}

#[tokio::test]
async fn test_disconnect_unregistered_is_noop() {
    let (tracker, _backend) = tracker_with(&[]).await;
    assert_eq!(
        tracker.mark_disconnected("service-1").await.unwrap(),
        DisconnectOutcome::NotRegistered
    );
}

#[tokio::test]
async fn test_force_disconnect_then_reconnect_rejected() {
    let (tracker, backend) = tracker_with(&[("c1", DeviceStatus::Online)]).await;

    assert!(tracker.force_disconnect("c1").await.unwrap());
    assert_eq!(status_of(&backend, "c1").await, DeviceStatus::Disconnected);

    // The transport drop that follows must not overwrite it
    tracker.mark_disconnected("c1").await.unwrap();
    assert_eq!(status_of(&backend, "c1").await, DeviceStatus::Disconnected);

    assert_eq!(
        tracker.mark_connected("c1").await.unwrap_err(),
        GateError::DeviceDisconnected
    );
    assert!(!tracker.force_disconnect("missing").await.unwrap());
}

#[tokio::test]
async fn test_provision_resets_sticky_status() {
    let (tracker, _backend) = tracker_with(&[("c1", DeviceStatus::Deleted)]).await;

    let record = tracker.provision("c1", "dev-new").await.unwrap();
    assert_eq!(record.status, DeviceStatus::Offline);

    let record = tracker.mark_connected("c1").await.unwrap();
    assert_eq!(record.status, DeviceStatus::Online);
    assert_eq!(record.device_id, "dev-new");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_events_never_resurrect_terminal_status() {
    let (tracker, backend) = tracker_with(&[("c1", DeviceStatus::Online)]).await;
    let tracker = Arc::new(tracker);

    let mut handles = Vec::new();
    for i in 0..50 {
        let tracker = tracker.clone();
        handles.push(tokio::spawn(async move {
            if i == 10 {
                tracker.delete("c1").await.map(|_| ())
            } else if i % 2 == 0 {
                tracker.mark_connected("c1").await.map(|_| ())
            } else {
                tracker.mark_disconnected("c1").await.map(|_| ())
            }
        }));
    }
    for handle in handles {
        // Connect attempts after the delete are rejected, that's fine
        let _ = handle.await.unwrap();
    }

    assert_eq!(status_of(&backend, "c1").await, DeviceStatus::Deleted);
}

#[tokio::test]
async fn test_store_failure_rejects_connect() {
    let tracker = DeviceTracker::new(Arc::new(UnavailableBackend), TIMEOUT);

    let err = tracker.mark_connected("c1").await.unwrap_err();
    assert!(matches!(err, GateError::StoreUnavailable(_)));
}

#[tokio::test]
async fn test_stalled_store_times_out() {
    let tracker = DeviceTracker::new(Arc::new(StalledBackend), Duration::from_millis(20));

    let err = tracker.mark_connected("c1").await.unwrap_err();
    assert!(matches!(err, GateError::StoreUnavailable(_)));

    let err = tracker.mark_disconnected("c1").await.unwrap_err();
    assert!(matches!(err, GateError::StoreUnavailable(_)));
}
