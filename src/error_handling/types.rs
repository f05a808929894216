//! Error type definitions.
//!
//! This module defines the errors produced by the admission controller, its
//! configuration, the throttled HTTP client and initialization code, plus the
//! admission event kinds tracked by [`super::AdmissionStats`].

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),

    /// The configured API base URL could not be parsed.
    #[error("Invalid API base URL: {0}")]
    BaseUrlError(#[from] url::ParseError),

    /// The admission policy is inconsistent.
    #[error("Admission configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}

/// Problems with an [`crate::AdmissionConfig`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The queue must hold at least one operation.
    #[error("max_queue_size must be greater than zero")]
    ZeroQueueSize,

    /// At least one recovery stage is required.
    #[error("recovery_thresholds must not be empty")]
    EmptyThresholds,

    /// Thresholds and increments describe the same stages.
    #[error("recovery_thresholds has {thresholds} entries but recovery_increments has {increments}")]
    MismatchedRecoveryStages {
        /// Number of thresholds configured
        thresholds: usize,
        /// Number of increments configured
        increments: usize,
    },

    /// Thresholds must be positive and strictly ascending.
    #[error("recovery_thresholds must be positive and strictly ascending: {0:?}")]
    UnorderedThresholds(Vec<u32>),

    /// Increments are fractions in `[0, 1)`.
    #[error("recovery increment {0} is outside [0, 1)")]
    InvalidIncrement(f64),

    /// The safety margin may only slow requests down.
    #[error("safety_margin must be a finite value >= 1.0, got {0}")]
    InvalidSafetyMargin(f64),
}

/// Raised when an operation is offered to a full queue.
///
/// The operation is never run. Returned inside an `anyhow::Error` from
/// [`crate::AdmissionController::enqueue_request`]; detect it with
/// [`super::is_queue_full`] or `downcast_ref::<QueueFullError>()`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Rate limit queue is full ({capacity} pending requests). Too many pending requests.")]
pub struct QueueFullError {
    /// Queue capacity at the time of rejection
    pub capacity: usize,
}

/// Failures that originate in the controller rather than the operation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    /// The queued operation was dropped by `reset()` before it could run.
    #[error("Queued request was discarded before it could run")]
    Discarded,
}

/// Errors returned by [`crate::ThrottledClient`].
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server answered 429; the controller has been notified.
    #[error("{message}")]
    RateLimited {
        /// Server-provided (or generic) explanation
        message: String,
    },

    /// Any other non-success status.
    #[error("Error {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Transport or decoding failure.
    #[error("HTTP request error: {0}")]
    Request(#[from] ReqwestError),

    /// The request path could not be joined onto the base URL.
    #[error("Invalid request path: {0}")]
    Url(#[from] url::ParseError),
}

/// Events counted by the admission statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum AdmissionEvent {
    /// A 429 was reported
    RateLimited,
    /// A success was reported
    Succeeded,
    /// An operation ran straight through while healthy
    Immediate,
    /// An operation was accepted into the queue
    Queued,
    /// An operation was refused because the queue was full
    Rejected,
    /// A queued operation was executed by the drain loop
    Drained,
    /// A queued operation was dropped by `reset()`
    Discarded,
}

impl AdmissionEvent {
    /// Stable snake_case name, used as the key in debug snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionEvent::RateLimited => "rate_limited",
            AdmissionEvent::Succeeded => "succeeded",
            AdmissionEvent::Immediate => "immediate",
            AdmissionEvent::Queued => "queued",
            AdmissionEvent::Rejected => "rejected",
            AdmissionEvent::Drained => "drained",
            AdmissionEvent::Discarded => "discarded",
        }
    }
}
