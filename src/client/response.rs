//! Error response bodies returned by the management API.

use serde::Deserialize;

use crate::admission::RateLimitInfo;

/// Message used when a 429 body carries no usable explanation.
pub const RATE_LIMITED_FALLBACK_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

/// JSON body of an API error, as sent with 429 responses.
///
/// `rateLimit` is only present when the server discloses its budget.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitErrorResponse {
    pub code: Option<u16>,
    pub message: String,
    pub reason: String,
    pub rate_limit: Option<RateLimitInfo>,
}

/// Extracts the budget and user-facing message from a 429 body.
///
/// Falls back to [`RateLimitInfo::default`] (20 requests per minute) when the
/// body is missing, unparseable, or has no `rateLimit` disclosure.
pub fn rate_limit_from_body(body: &[u8]) -> (RateLimitInfo, String) {
    match serde_json::from_slice::<RateLimitErrorResponse>(body) {
        Ok(response) => {
            let message = if response.message.trim().is_empty() {
                RATE_LIMITED_FALLBACK_MESSAGE.to_string()
            } else {
                response.message
            };
            (response.rate_limit.unwrap_or_default(), message)
        }
        Err(e) => {
            log::debug!("Could not parse 429 response body, using default rate limit: {e}");
            (
                RateLimitInfo::default(),
                RATE_LIMITED_FALLBACK_MESSAGE.to_string(),
            )
        }
    }
}
