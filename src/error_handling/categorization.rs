//! Error categorization.
//!
//! Helpers for recognising admission-related failures inside an
//! `anyhow::Error` chain, the way callers see them after `enqueue_request`.

use super::types::{AdmissionError, ApiError, QueueFullError};

/// Returns `true` if the error (or any cause) is a queue-full rejection.
pub fn is_queue_full(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| cause.downcast_ref::<QueueFullError>().is_some())
}

/// Returns `true` if the error (or any cause) is a discarded queued operation.
pub fn is_discarded(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<AdmissionError>(),
            Some(AdmissionError::Discarded)
        )
    })
}

/// Returns `true` if the error chain contains a server 429.
///
/// Matches both [`ApiError::RateLimited`] and raw `reqwest` status errors.
pub fn is_rate_limited(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        if let Some(api_err) = cause.downcast_ref::<ApiError>() {
            matches!(api_err, ApiError::RateLimited { .. })
        } else if let Some(reqwest_err) = cause.downcast_ref::<reqwest::Error>() {
            reqwest_err
                .status()
                .map(|s| s.as_u16() == crate::config::HTTP_STATUS_TOO_MANY_REQUESTS)
                .unwrap_or(false)
        } else {
            false
        }
    })
}
