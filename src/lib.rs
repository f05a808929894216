//! fleet_admission: adaptive client-side request admission control
//!
//! This library keeps a client of a rate-limited management API inside the
//! server's budget. It does nothing while the server is healthy. Once a 429
//! discloses a requests/window budget, calls are queued and paced, pollers
//! are told to slow down, and consecutive successes walk the client back to
//! its normal cadence.
//!
//! # Example
//!
//! ```no_run
//! use fleet_admission::{init_client, ClientConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = init_client(&ClientConfig {
//!     base_url: "https://fleet.example.com/api/v1/".into(),
//!     ..Default::default()
//! })?;
//!
//! let _banner = client.controller().subscribe(|n| {
//!     if !n.message.is_empty() {
//!         eprintln!("{}", n.message);
//!     }
//! });
//!
//! let devices: serde_json::Value = client.get_json("devices").await?;
//! println!("{} devices; next poll in {:?}", devices["count"], client.controller().recommended_interval());
//! # Ok(())
//! # }
//! ```
//!
//! The controller can also be used on its own to gate arbitrary async work:
//!
//! ```
//! use fleet_admission::{AdmissionController, OperatingState, RateLimitInfo};
//!
//! let controller = AdmissionController::default();
//! controller.notify_429(RateLimitInfo::new(20, 60.0, 60.0));
//! assert_eq!(controller.state(), OperatingState::Throttled);
//! assert_eq!(controller.recommended_interval_ms(), 4500.0);
//! ```
//!
//! # Requirements
//!
//! Queued operations are drained by a task spawned on the current Tokio
//! runtime, so `enqueue_request` must be called from within one.

pub mod admission;
pub mod client;
pub mod config;
mod error_handling;
pub mod initialization;

// Re-export public API
pub use admission::{
    pressure_multiplier, AdmissionController, DebugInfo, NotificationCallback, NotificationLevel,
    OperatingState, RateLimitInfo, RateLimitNotification, RecoveryProgress, Subscription,
};
pub use client::{RateLimitErrorResponse, ThrottledClient};
pub use config::{AdmissionConfig, ClientConfig, LogFormat, LogLevel};
pub use error_handling::{
    is_discarded, is_queue_full, is_rate_limited, AdmissionError, AdmissionEvent, AdmissionStats,
    ApiError, ConfigError, InitializationError, QueueFullError,
};
pub use initialization::{init_client, init_logger_with};
