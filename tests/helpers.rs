// Shared test helpers for controller and client tests.
//
// This module provides common utilities used across multiple test files to reduce duplication.

use std::sync::{Arc, Mutex};

use fleet_admission::{
    AdmissionConfig, AdmissionController, RateLimitInfo, RateLimitNotification, Subscription,
};

/// The budget used throughout the scenarios: 20 requests per minute.
#[allow(dead_code)] // Used by other test files
pub fn twenty_per_minute() -> RateLimitInfo {
    RateLimitInfo::new(20, 60.0, 60.0)
}

/// Creates a controller that has already received a 429.
#[allow(dead_code)]
pub fn throttled_controller(config: AdmissionConfig) -> AdmissionController {
    let controller = AdmissionController::new(config).expect("Test config should be valid");
    controller.notify_429(twenty_per_minute());
    controller
}

/// Reports `n` successes.
#[allow(dead_code)]
pub fn succeed(controller: &AdmissionController, n: u32) {
    for _ in 0..n {
        controller.notify_success();
    }
}

/// Notifications captured by a recording observer.
pub type Recorded = Arc<Mutex<Vec<RateLimitNotification>>>;

/// Subscribes an observer that records every notification it receives.
#[allow(dead_code)]
pub fn record_notifications(controller: &AdmissionController) -> (Subscription, Recorded) {
    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&recorded);
    let subscription = controller.subscribe(move |n| {
        sink.lock().expect("recorder lock").push(n.clone());
    });
    (subscription, recorded)
}

/// Convenience accessor for the recorded notifications.
#[allow(dead_code)]
pub fn take(recorded: &Recorded) -> Vec<RateLimitNotification> {
    std::mem::take(&mut *recorded.lock().expect("recorder lock"))
}
