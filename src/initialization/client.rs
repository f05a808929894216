//! HTTP client initialization.
//!
//! This module builds the `reqwest::Client` used for API calls and wraps it,
//! together with a fresh admission controller, in a [`ThrottledClient`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::ClientBuilder;
use url::Url;

use crate::admission::AdmissionController;
use crate::client::ThrottledClient;
use crate::config::ClientConfig;
use crate::error_handling::InitializationError;

/// Initializes the underlying HTTP client.
///
/// Creates a `reqwest::Client` configured with the User-Agent and timeout
/// from `config`.
///
/// # Errors
///
/// Returns a `reqwest::Error` if client creation fails.
pub fn init_http_client(config: &ClientConfig) -> Result<Arc<reqwest::Client>, reqwest::Error> {
    let client = ClientBuilder::new()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(config.user_agent.clone())
        .build()?;
    Ok(Arc::new(client))
}

/// Initializes a throttled API client.
///
/// The admission policy is validated first, then the base URL is parsed and
/// the HTTP client built.
///
/// # Errors
///
/// - `InitializationError::ConfigError` if the admission policy is inconsistent
/// - `InitializationError::BaseUrlError` if `base_url` is not a valid URL
/// - `InitializationError::HttpClientError` if client creation fails
pub fn init_client(config: &ClientConfig) -> Result<ThrottledClient, InitializationError> {
    let controller = AdmissionController::new(config.admission.clone())?;
    let base_url = Url::parse(&config.base_url)?;
    let http = init_http_client(config)?;

    log::debug!(
        "Initialized API client for {} (timeout {}s, queue capacity {})",
        base_url,
        config.timeout_seconds,
        config.admission.max_queue_size
    );

    Ok(ThrottledClient::new(http, base_url, controller))
}
