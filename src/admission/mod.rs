//! Adaptive admission control driven by server-reported rate limits.
//!
//! This module implements a reactive client-side limiter:
//! - A 429 carrying a requests/window budget switches the client to `Throttled`
//!   and sets the pacing interval to `window / requests * safety margin`
//! - While throttled, outgoing operations wait in a bounded FIFO queue drained
//!   by a single loop; the pause between items grows with queue pressure
//! - Successes move the client through staged recovery back to `Normal`
//! - Observers receive pressure snapshots on every state or queue change
//!
//! Nothing is limited while healthy: admission control only activates after
//! the server reports a violation.

mod controller;
mod notification;
mod queue;
mod state;

pub use controller::{AdmissionController, DebugInfo};
pub use notification::{
    NotificationCallback, NotificationLevel, RateLimitNotification, Subscription,
};
pub use queue::pressure_multiplier;
pub use state::{OperatingState, RateLimitInfo, RecoveryProgress};
