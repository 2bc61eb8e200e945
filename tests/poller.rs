//! Poller Integration Tests
//!
//! Tests for deadlines, cancellation and request status handling.

mod common;

use std::time::{Duration, Instant};

use snapforge::adapters::ResourceClient;
use snapforge::core::{BuildError, CancelToken, PollSettings, Poller, Probe};
use snapforge::domain::TrackingHandle;
use tokio_test::{assert_err, assert_ok};

use common::FakeCloud;

#[tokio::test]
async fn test_timeout_fires_at_deadline_not_before() {
    let deadline = Duration::from_millis(150);
    let poller = Poller::new(
        PollSettings::fixed(Duration::from_millis(20), deadline),
        CancelToken::new(),
    );

    let started = Instant::now();
    let result: Result<(), _> = poller
        .poll_until("never ready", || async {
            Ok(Probe::Pending("RUNNING".to_string()))
        })
        .await;
    let elapsed = started.elapsed();

    let error = assert_err!(result);
    assert!(error.is_timeout(), "unexpected {:?}", error);
    assert!(elapsed >= deadline, "gave up early after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "overran deadline: {:?}", elapsed);
}

#[tokio::test]
async fn test_hanging_probe_is_cut_off_at_deadline() {
    let deadline = Duration::from_millis(100);
    let poller = Poller::new(
        PollSettings::fixed(Duration::from_millis(10), deadline),
        CancelToken::new(),
    );

    let started = Instant::now();
    let result: Result<(), _> = poller
        .poll_until("hung call", || std::future::pending())
        .await;

    assert!(assert_err!(result).is_timeout());
    assert!(started.elapsed() >= deadline);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_cancel_interrupts_wait() {
    let cancel = CancelToken::new();
    let poller = Poller::new(
        PollSettings::fixed(Duration::from_millis(10), Duration::from_secs(60)),
        cancel.clone(),
    );

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let started = Instant::now();
    let result: Result<(), _> = poller
        .poll_until("cancellable", || async {
            Ok(Probe::Pending("RUNNING".to_string()))
        })
        .await;

    match assert_err!(result) {
        BuildError::Cancelled { what } => assert_eq!(what, "cancellable"),
        other => panic!("expected cancellation, got {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_request_done_and_failed() {
    let cloud = FakeCloud::new();
    cloud.fail_request("server", "no capacity in us/las");
    let poller = Poller::new(common::fast_polling(), CancelToken::new());

    let done = TrackingHandle::new("https://api.example.test/requests/lan/status");
    assert_ok!(poller.await_request(cloud.as_ref(), &done).await);

    let failed = TrackingHandle::new("https://api.example.test/requests/server/status");
    match assert_err!(poller.await_request(cloud.as_ref(), &failed).await) {
        BuildError::RemoteFailed { handle, reason } => {
            assert_eq!(handle, failed.as_str());
            assert_eq!(reason, "no capacity in us/las");
        }
        other => panic!("expected remote failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stuck_request_times_out_distinct_from_failure() {
    let cloud = FakeCloud::new();
    cloud.stall_request("datacenter");
    let poller = Poller::new(
        PollSettings::fixed(Duration::from_millis(5), Duration::from_millis(60)),
        CancelToken::new(),
    );

    let handle = TrackingHandle::new("https://api.example.test/requests/datacenter/status");
    let error = assert_err!(poller.await_request(cloud.as_ref(), &handle).await);

    assert!(error.is_timeout());
    assert!(!error.is_remote_failure());
}

#[tokio::test]
async fn test_snapshot_and_deletion_waits() {
    let cloud = FakeCloud::new();
    let poller = Poller::new(common::fast_polling(), CancelToken::new());

    assert_ok!(poller.await_snapshot_available(cloud.as_ref(), "snap-1").await);

    assert_ok!(cloud.delete_datacenter("dc-9").await);
    assert_ok!(poller.await_datacenter_deleted(cloud.as_ref(), "dc-9").await);
}
