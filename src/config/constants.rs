//! Configuration constants.
//!
//! This module defines the defaults for the admission controller and the
//! thresholds that drive queue pressure notifications and drain pacing.

use std::time::Duration;

/// Maximum number of operations that may wait in the queue while throttled.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

/// Success counts at which recovery advances a stage.
///
/// The first entry moves the controller from throttled into recovery; each
/// following entry relaxes pacing by one step.
pub const DEFAULT_RECOVERY_THRESHOLDS: [u32; 3] = [10, 20, 30];

/// Fraction by which the interval shrinks at each recovery stage.
pub const DEFAULT_RECOVERY_INCREMENTS: [f64; 3] = [0.1, 0.1, 0.1];

/// Multiplier applied to the server-reported safe interval (1.5 = 50% slower).
pub const DEFAULT_SAFETY_MARGIN: f64 = 1.5;

/// Polling cadence recommended while healthy.
///
/// Matches the periodic refresh timer used by the console's list pages.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(10);

// Fallback budget when a 429 carries no rate limit disclosure: 20 requests/minute
pub const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 20;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: f64 = 60.0;
pub const DEFAULT_RATE_LIMIT_RETRY_AFTER_SECS: f64 = 60.0;

// Queue occupancy thresholds (percent of capacity)
/// Show the "high traffic" warning banner
pub const QUEUE_WARNING_PERCENTAGE: f64 = 10.0;
/// Drain delay multiplied by 1.5
pub const QUEUE_HIGH_PRESSURE_PERCENTAGE: f64 = 75.0;
/// Drain delay multiplied by 2.0
pub const QUEUE_CRITICAL_PRESSURE_PERCENTAGE: f64 = 90.0;
/// Show the critical banner
pub const QUEUE_FULL_PERCENTAGE: f64 = 100.0;

pub const HIGH_PRESSURE_MULTIPLIER: f64 = 1.5;
pub const CRITICAL_PRESSURE_MULTIPLIER: f64 = 2.0;

pub const WARNING_MESSAGE: &str =
    "The system is experiencing high traffic. Some requests may be delayed.";
pub const CRITICAL_MESSAGE: &str =
    "Unable to process requests. Please wait for the system to recover.";

// HTTP
/// HTTP 429 Too Many Requests status code
pub const HTTP_STATUS_TOO_MANY_REQUESTS: u16 = 429;
/// HTTP request timeout for the API client
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str = concat!("fleet_admission/", env!("CARGO_PKG_VERSION"));
