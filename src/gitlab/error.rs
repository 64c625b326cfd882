//! GitLab API error types.
//!
//! Non-2xx responses carry a JSON body with a `message` or `error` field in
//! most cases; when the body isn't JSON (HTML error pages, proxies) the raw
//! text is surfaced instead. A non-JSON response is always a failure, never
//! silently swallowed.

use thiserror::Error;

/// An error from the GitLab API or the transport underneath it.
#[derive(Debug, Error)]
pub enum GitLabApiError {
    /// The request could not be sent or the response could not be read
    /// (connection failure, timeout, TLS, body decode).
    #[error("GitLab request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// GitLab answered with a non-2xx status.
    #[error("GitLab API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// A 2xx response whose body did not have the expected shape.
    #[error("unexpected GitLab response: {0}")]
    UnexpectedResponse(String),
}

impl GitLabApiError {
    /// Builds an [`GitLabApiError::Api`] from a response status and body.
    ///
    /// The body is parsed as JSON when possible, preferring the `message`
    /// field, then `error`; anything else (including non-JSON) surfaces the
    /// raw text.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = match serde_json::from_str::<serde_json::Value>(body) {
            Ok(json) => extract_message(&json).unwrap_or_else(|| body.trim().to_string()),
            Err(_) => body.trim().to_string(),
        };
        GitLabApiError::Api { status, message }
    }
}

fn extract_message(json: &serde_json::Value) -> Option<String> {
    for field in ["message", "error"] {
        match json.get(field) {
            Some(serde_json::Value::String(s)) => return Some(s.clone()),
            // GitLab sometimes nests validation errors as objects/arrays.
            Some(other) if !other.is_null() => return Some(other.to_string()),
            _ => {}
        }
    }
    None
}
