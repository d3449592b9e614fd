//! Shared HTTP plumbing for the remote metric backends.

use std::time::Duration;

use metricflow_core::BackendError;
use reqwest::StatusCode;
use serde_json::Value;

/// Build the HTTP client used by a backend.
pub(crate) fn build_client(user_agent: &str) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .build()
        .map_err(|e| BackendError::unavailable(format!("Failed to build HTTP client: {e}")))
}

/// Map a transport error onto the backend failure taxonomy.
pub(crate) fn classify_request_error(error: &reqwest::Error, timeout: Duration) -> BackendError {
    if error.is_timeout() {
        BackendError::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    } else if error.is_decode() || error.is_body() {
        BackendError::validation(format!("Unreadable response body: {error}"))
    } else {
        BackendError::transient(format!("HTTP request failed: {error}"))
    }
}

/// Map a non-success status onto the backend failure taxonomy.
///
/// Server errors, throttling and request timeouts are transient; anything
/// else means the request itself was rejected.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> BackendError {
    let message = format!("HTTP {status}: {}", truncate(body, 512));
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        BackendError::transient(message)
    } else {
        BackendError::validation(message)
    }
}

/// Read a JSON body, classifying failures.
pub(crate) async fn read_json(
    response: reqwest::Response,
    timeout: Duration,
) -> Result<Value, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(status, &body));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| classify_request_error(&e, timeout))
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
