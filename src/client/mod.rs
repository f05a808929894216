//! Throttled management API client.
//!
//! [`ThrottledClient`] wraps a `reqwest::Client` and routes every call
//! through an [`AdmissionController`]: calls run immediately while the
//! controller is `Normal` and are queued otherwise. Responses feed the
//! controller back (2xx counts as a success, 429 as a rate-limit signal).

mod response;

pub use response::{rate_limit_from_body, RateLimitErrorResponse, RATE_LIMITED_FALLBACK_MESSAGE};

use std::sync::Arc;

use anyhow::Context;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::admission::AdmissionController;
use crate::config::HTTP_STATUS_TOO_MANY_REQUESTS;
use crate::error_handling::ApiError;

/// Content type sent with `PATCH` bodies.
const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

/// HTTP client whose calls are admitted by a shared [`AdmissionController`].
///
/// Cloning is cheap; clones share the connection pool and the controller.
#[derive(Clone)]
pub struct ThrottledClient {
    http: Arc<reqwest::Client>,
    base_url: Url,
    controller: AdmissionController,
}

impl ThrottledClient {
    /// Creates a client from its parts.
    ///
    /// `base_url` should end with `/` so relative paths join beneath it.
    pub fn new(http: Arc<reqwest::Client>, base_url: Url, controller: AdmissionController) -> Self {
        ThrottledClient {
            http,
            base_url,
            controller,
        }
    }

    /// The controller every call is routed through.
    pub fn controller(&self) -> &AdmissionController {
        &self.controller
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `path` against the base URL. A leading `/` is ignored.
    pub fn url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    pub async fn get_json<T>(&self, path: &str) -> anyhow::Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let request = self.request(Method::GET, path)?;
        self.send(request).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> anyhow::Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Send + 'static,
    {
        let request = self.request(Method::POST, path)?.json(body);
        self.send(request).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> anyhow::Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Send + 'static,
    {
        let request = self.request(Method::PUT, path)?.json(body);
        self.send(request).await
    }

    /// Sends a JSON Patch document (`application/json-patch+json`).
    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> anyhow::Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Send + 'static,
    {
        let payload = serde_json::to_vec(body).context("Failed to serialize PATCH body")?;
        let request = self
            .request(Method::PATCH, path)?
            .header(reqwest::header::CONTENT_TYPE, JSON_PATCH_CONTENT_TYPE)
            .body(payload);
        self.send(request).await
    }

    /// Deletes a resource. An empty response body decodes as JSON `null`,
    /// so `T = ()` works for `204 No Content`.
    pub async fn delete<T>(&self, path: &str) -> anyhow::Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let request = self.request(Method::DELETE, path)?;
        self.send(request).await
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let url = self.url(path)?;
        Ok(self.http.request(method, url))
    }

    async fn send<T>(&self, request: RequestBuilder) -> anyhow::Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let controller = self.controller.clone();
        if self.controller.is_throttled() {
            log::debug!(
                "Controller is {}; queueing request ({} already waiting)",
                self.controller.state(),
                self.controller.queue_len()
            );
            self.controller
                .enqueue_request(move || execute::<T>(controller, request))
                .await
        } else {
            execute(controller, request).await
        }
    }
}

impl std::fmt::Debug for ThrottledClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottledClient")
            .field("base_url", &self.base_url.as_str())
            .field("controller", &self.controller)
            .finish()
    }
}

/// Sends the request and reports the outcome to the controller.
async fn execute<T>(controller: AdmissionController, request: RequestBuilder) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    let response = request.send().await.map_err(ApiError::from)?;
    let status = response.status();
    let url = response.url().clone();

    if status.is_success() {
        controller.notify_success();
        let body = response.bytes().await.map_err(ApiError::from)?;
        return decode_body(&body)
            .with_context(|| format!("Failed to decode response body from {}", url));
    }

    if status.as_u16() == HTTP_STATUS_TOO_MANY_REQUESTS {
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                log::debug!("Could not read 429 body from {}: {}", url, e);
                Default::default()
            }
        };
        let (info, message) = rate_limit_from_body(&body);
        log::warn!(
            "Rate limited by {} ({} requests per {}s)",
            url,
            info.requests_allowed,
            info.window_seconds
        );
        controller.notify_429(info);
        return Err(ApiError::RateLimited { message }.into());
    }

    let text = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        message: status_message(status, text),
    }
    .into())
}

/// Message for a non-success, non-429 response.
///
/// 404 bodies carry nothing useful (`{"message": ""}`), so they always use the
/// reason phrase. Otherwise a JSON `message` field wins over the raw body.
fn status_message(status: StatusCode, body: String) -> String {
    let reason = status.canonical_reason().unwrap_or("Unknown status");
    if status == StatusCode::NOT_FOUND {
        return reason.to_string();
    }
    if let Ok(serde_json::Value::Object(fields)) = serde_json::from_str(&body) {
        return match fields.get("message").and_then(|m| m.as_str()) {
            Some(message) if !message.trim().is_empty() => message.to_string(),
            _ => reason.to_string(),
        };
    }
    if body.trim().is_empty() {
        reason.to_string()
    } else {
        body
    }
}

fn decode_body<T: DeserializeOwned>(body: &[u8]) -> serde_json::Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_slice(b"null")
    } else {
        serde_json::from_slice(body)
    }
}
