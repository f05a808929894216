//! Observer registry behavior.
//!
//! Observers are UI code the controller does not trust: a panicking or
//! re-entrant observer must not disturb other observers, the controller's
//! state, or the drain loop.

mod helpers;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use fleet_admission::{
    AdmissionConfig, AdmissionController, AdmissionEvent, NotificationLevel, OperatingState,
    RateLimitNotification,
};
use helpers::{record_notifications, succeed, take, throttled_controller, twenty_per_minute};

#[test]
fn test_subscribe_delivers_current_snapshot_only_to_new_observer() {
    let controller = AdmissionController::default();
    let (_first, first_seen) = record_notifications(&controller);
    let (_second, second_seen) = record_notifications(&controller);

    assert_eq!(take(&first_seen).len(), 1);
    let snapshot = take(&second_seen);
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].state, OperatingState::Normal);
    assert_eq!(snapshot[0].level, NotificationLevel::Normal);
    assert_eq!(snapshot[0].queue_capacity, 100);
}

#[test]
fn test_every_transition_is_broadcast() {
    let controller = AdmissionController::default();
    let (_subscription, recorded) = record_notifications(&controller);
    take(&recorded);

    controller.notify_429(twenty_per_minute());
    succeed(&controller, 40);

    let states: Vec<OperatingState> = take(&recorded).iter().map(|n| n.state).collect();
    assert_eq!(
        states,
        vec![
            OperatingState::Throttled,  // 429
            OperatingState::Recovering, // 10 successes
            OperatingState::Recovering, // stage 1
            OperatingState::Recovering, // stage 2
            OperatingState::Normal,     // recovered
        ]
    );
}

#[test]
fn test_panicking_observer_is_contained() {
    let controller = AdmissionController::default();
    let _bad = controller.subscribe(|_| panic!("banner component crashed"));
    let (_good, recorded) = record_notifications(&controller);
    take(&recorded);

    controller.notify_429(twenty_per_minute());

    assert_eq!(controller.state(), OperatingState::Throttled);
    assert_eq!(take(&recorded).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_observer_does_not_stall_drain() {
    let controller = throttled_controller(AdmissionConfig::default());
    let _bad = controller.subscribe(|n| {
        if n.queue_size == 0 {
            panic!("observer cannot handle an empty queue");
        }
    });

    let values = futures::future::join_all(
        (0..3).map(|i| controller.enqueue_request(move || async move { Ok(i) })),
    )
    .await;
    let values: Vec<i32> = values
        .into_iter()
        .map(|r| r.expect("queued request succeeds"))
        .collect();
    assert_eq!(values, vec![0, 1, 2]);
    assert!(!controller.debug_info().processing);
}

#[test]
fn test_observer_may_reenter_controller() {
    let controller = AdmissionController::default();
    let intervals = Arc::new(Mutex::new(Vec::new()));

    let handle = controller.clone();
    let sink = Arc::clone(&intervals);
    let _subscription = controller.subscribe(move |_| {
        let info = handle.debug_info();
        sink.lock()
            .expect("sink lock")
            .push((handle.recommended_interval_ms(), info.queue_length));
    });
    controller.notify_429(twenty_per_minute());

    assert_eq!(
        *intervals.lock().expect("sink lock"),
        vec![(10000.0, 0), (4500.0, 0)]
    );
}

#[test]
fn test_observer_may_unsubscribe_others_during_delivery() {
    let controller = AdmissionController::default();
    let calls = Arc::new(AtomicUsize::new(0));

    let victim_calls = Arc::clone(&calls);
    let victim = controller.subscribe(move |_| {
        victim_calls.fetch_add(1, Ordering::SeqCst);
    });
    let victim = Arc::new(Mutex::new(Some(victim)));

    let slot = Arc::clone(&victim);
    let _killer = controller.subscribe(move |n: &RateLimitNotification| {
        if n.state == OperatingState::Throttled {
            if let Some(subscription) = slot.lock().expect("slot lock").take() {
                subscription.unsubscribe();
            }
        }
    });
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The victim was registered first, so it still sees this broadcast
    controller.notify_429(twenty_per_minute());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    controller.notify_success();
    controller.reset();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(controller.debug_info().subscribers, 1);
}

#[test]
fn test_unsubscribe_is_idempotent_across_handles() {
    let controller = AdmissionController::default();
    let subscription = controller.subscribe(|_| {});
    let id = subscription.id();
    assert!(subscription.unsubscribe());
    assert_eq!(controller.debug_info().subscribers, 0);

    let other = controller.subscribe(|_| {});
    assert_ne!(other.id(), id);
}

#[test]
fn test_reset_keeps_observers() {
    let controller = throttled_controller(AdmissionConfig::default());
    let (_subscription, recorded) = record_notifications(&controller);
    take(&recorded);

    controller.reset();

    let seen = take(&recorded);
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].state, OperatingState::Normal);
    assert_eq!(controller.debug_info().subscribers, 1);
}

#[test]
fn test_last_notification_matches_state_across_threads() {
    let controller = throttled_controller(AdmissionConfig::default());
    succeed(&controller, 39);
    assert_eq!(controller.state(), OperatingState::Recovering);

    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let entered_tx = Mutex::new(entered_tx);
    let release_rx = Mutex::new(release_rx);
    let held = AtomicBool::new(false);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    let _subscription = controller.subscribe(move |n| {
        // Hold the first Normal delivery until the main thread has throttled again
        if n.state == OperatingState::Normal && !held.swap(true, Ordering::SeqCst) {
            let _ = entered_tx.lock().expect("entered lock").send(());
            let _ = release_rx
                .lock()
                .expect("release lock")
                .recv_timeout(Duration::from_secs(5));
        }
        sink.lock().expect("seen lock").push(n.state);
    });

    let worker = controller.clone();
    let recovering = thread::spawn(move || worker.notify_success());
    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("observer received the Normal notification");

    controller.notify_429(twenty_per_minute());
    release_tx.send(()).expect("observer still waiting");
    recovering.join().expect("recovering thread finished");

    let seen = seen.lock().expect("seen lock").clone();
    assert_eq!(
        seen,
        vec![
            OperatingState::Recovering,
            OperatingState::Normal,
            OperatingState::Throttled
        ]
    );
    assert_eq!(seen.last(), Some(&controller.state()));
}

#[test]
fn test_state_change_raised_by_observer_is_delivered_after_snapshot() {
    let controller = AdmissionController::default();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let handle = controller.clone();
    let sink = Arc::clone(&seen);
    let _subscription = controller.subscribe(move |n| {
        sink.lock().expect("seen lock").push(n.state);
        // State changes raised from inside a delivery are delivered after it
        let throttled_once = handle.stats().get(AdmissionEvent::RateLimited) > 0;
        if n.state == OperatingState::Normal && !throttled_once {
            handle.notify_429(twenty_per_minute());
        }
    });

    assert_eq!(
        *seen.lock().expect("seen lock"),
        vec![OperatingState::Normal, OperatingState::Throttled]
    );
}
