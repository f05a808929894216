//! Error handling and admission statistics.
//!
//! This module provides:
//! - Error type definitions (configuration, admission, HTTP, initialization)
//! - Helpers to recognise admission failures in `anyhow` error chains
//! - Admission event counters

mod categorization;
mod stats;
mod types;

// Re-export public API
pub use categorization::{is_discarded, is_queue_full, is_rate_limited};
pub use stats::AdmissionStats;
pub use types::{
    AdmissionError, AdmissionEvent, ApiError, ConfigError, InitializationError, QueueFullError,
};
