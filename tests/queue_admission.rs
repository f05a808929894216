//! Queue admission behavior while throttled.
//!
//! These tests run on a paused Tokio clock so drain pacing completes
//! instantly while still being observable through `tokio::time::Instant`.

mod helpers;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use tokio::time::Instant;

use fleet_admission::{
    is_discarded, is_queue_full, AdmissionConfig, AdmissionController, AdmissionEvent,
    NotificationLevel, OperatingState, QueueFullError,
};
use helpers::{record_notifications, take, throttled_controller};

#[tokio::test(start_paused = true)]
async fn test_full_queue_rejects_next_request() {
    let controller = throttled_controller(AdmissionConfig {
        max_queue_size: 3,
        ..Default::default()
    });

    let mut pending = Vec::new();
    for i in 0..3u32 {
        let mut call = Box::pin(controller.enqueue_request(move || async move { Ok(i) }));
        assert!(futures::poll!(call.as_mut()).is_pending());
        pending.push(call);
    }
    assert_eq!(controller.queue_len(), 3);

    let ran = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&ran);
    let rejected = controller
        .enqueue_request(move || async move {
            *flag.lock().expect("flag lock") = true;
            Ok(99u32)
        })
        .now_or_never()
        .expect("rejection is immediate");

    let err = rejected.unwrap_err();
    assert!(is_queue_full(&err));
    assert_eq!(
        err.downcast_ref::<QueueFullError>(),
        Some(&QueueFullError { capacity: 3 })
    );
    assert_eq!(controller.queue_len(), 3);

    let values: Vec<u32> = join_all(pending)
        .await
        .into_iter()
        .map(|r| r.expect("queued request succeeds"))
        .collect();
    assert_eq!(values, vec![0, 1, 2]);
    assert!(!*ran.lock().expect("flag lock"));
    assert_eq!(controller.stats().get(AdmissionEvent::Rejected), 1);
}

#[tokio::test(start_paused = true)]
async fn test_queued_requests_are_paced() {
    let controller = throttled_controller(AdmissionConfig::default());
    let started = Instant::now();
    let finished = Arc::new(Mutex::new(Vec::new()));

    let calls = (0..3).map(|_| {
        let finished = Arc::clone(&finished);
        controller.enqueue_request(move || async move {
            finished.lock().expect("finish lock").push(started.elapsed());
            Ok(())
        })
    });
    for result in join_all(calls).await {
        result.expect("queued request succeeds");
    }

    let finished = finished.lock().expect("finish lock").clone();
    assert_eq!(finished.len(), 3);
    assert!(finished[0] < Duration::from_millis(5));
    // 4500ms between items with light queue pressure
    assert!(finished[1] >= Duration::from_millis(4500));
    assert!(finished[2] >= Duration::from_millis(9000));
    assert!(finished[2] < Duration::from_millis(9050));
}

#[tokio::test(start_paused = true)]
async fn test_queue_keeps_draining_after_recovery_starts() {
    let controller = throttled_controller(AdmissionConfig::default());
    let feedback = controller.clone();

    // Each queued request reports a success, as the HTTP layer would
    let calls = (0..12).map(|i| {
        let feedback = feedback.clone();
        controller.enqueue_request(move || async move {
            feedback.notify_success();
            Ok(i)
        })
    });
    let results = join_all(calls).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(controller.state(), OperatingState::Recovering);
    assert_eq!(controller.queue_len(), 0);
    assert!(!controller.debug_info().processing);
}

#[tokio::test(start_paused = true)]
async fn test_queue_notifications_track_pressure() {
    let controller = throttled_controller(AdmissionConfig {
        max_queue_size: 10,
        ..Default::default()
    });
    let (_subscription, recorded) = record_notifications(&controller);
    take(&recorded);

    controller
        .enqueue_request(|| async { Ok(()) })
        .await
        .expect("queued request succeeds");

    let seen = take(&recorded);
    // enqueue (1 of 10), dequeue (0 of 10), drain finished (0 of 10)
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0].queue_size, 1);
    assert_eq!(seen[0].level, NotificationLevel::Warning);
    assert_eq!(seen[0].queue_percentage, 10.0);
    assert!(seen[1..].iter().all(|n| n.queue_size == 0));
    assert!(seen[1..].iter().all(|n| n.level == NotificationLevel::Normal));
    assert!(seen.iter().all(|n| n.state == OperatingState::Throttled));
}

#[tokio::test]
async fn test_reset_discards_pending_callers() {
    let controller = throttled_controller(AdmissionConfig::default());
    let mut pending = Box::pin(controller.enqueue_request(|| async { Ok(1u8) }));
    assert!(futures::poll!(pending.as_mut()).is_pending());

    controller.reset();

    let err = pending.await.unwrap_err();
    assert!(is_discarded(&err));
    assert_eq!(controller.state(), OperatingState::Normal);

    // Healthy again: requests run straight through
    let value = controller
        .enqueue_request(|| async { Ok(2u8) })
        .await
        .expect("runs immediately");
    assert_eq!(value, 2);
    assert_eq!(controller.stats().get(AdmissionEvent::Immediate), 1);
}

#[tokio::test]
async fn test_normal_state_has_no_admission_limit() {
    let controller = AdmissionController::new(AdmissionConfig {
        max_queue_size: 1,
        ..Default::default()
    })
    .expect("valid config");

    let calls = (0..50).map(|i| controller.enqueue_request(move || async move { Ok(i) }));
    let results = join_all(calls).await;
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 50);
    assert_eq!(controller.stats().get(AdmissionEvent::Queued), 0);
}
