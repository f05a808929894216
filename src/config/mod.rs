//! Admission controller configuration and constants.
//!
//! This module provides:
//! - Default values and pressure thresholds
//! - `AdmissionConfig` (recovery policy, queue bound, safety margin)
//! - `ClientConfig` for the throttled HTTP client
//! - Logging option types

mod constants;
mod types;

// Re-export all constants
pub use constants::*;
pub use types::{AdmissionConfig, ClientConfig, LogFormat, LogLevel};
