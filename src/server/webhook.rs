//! Webhook endpoint handler.
//!
//! Thin transport shim: pulls the GitLab headers off the request, hands the
//! raw body to the orchestrator, and maps the terminal [`Outcome`] to an
//! HTTP response. All policy lives in the orchestrator.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use super::AppState;
use crate::orchestrator::Outcome;

/// Header carrying the GitLab event kind, e.g. `Note Hook`.
const HEADER_EVENT: &str = "x-gitlab-event";
/// Header carrying the shared webhook secret.
const HEADER_TOKEN: &str = "x-gitlab-token";

/// Webhook handler.
///
/// # Request
///
/// - Method: POST
/// - Headers:
///   - `X-Gitlab-Event`: event kind; anything but `Note Hook` is ignored
///   - `X-Gitlab-Token`: shared secret
/// - Body: JSON webhook payload
///
/// # Response
///
/// - 200 with `{"status": "started", ...}` when a pipeline was triggered
/// - 200 with `{"status": "ignored"}` or `{"status": "disabled"}`
/// - 401 on secret mismatch
/// - 429 when rate limited
/// - 500 when a processing stage failed (details logged, not returned)
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = header_str(&headers, HEADER_TOKEN);
    let event_kind = header_str(&headers, HEADER_EVENT);

    let outcome = app_state
        .orchestrator()
        .handle(token, event_kind, &body)
        .await;

    outcome_response(outcome)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn outcome_response(outcome: Outcome) -> Response {
    match outcome {
        Outcome::Started { pipeline, branch } => (
            StatusCode::OK,
            Json(json!({
                "status": "started",
                "pipeline": pipeline,
                "branch": branch,
            })),
        )
            .into_response(),
        Outcome::Ignored { reason } => (
            StatusCode::OK,
            Json(json!({ "status": "ignored", "reason": reason })),
        )
            .into_response(),
        Outcome::Disabled => {
            (StatusCode::OK, Json(json!({ "status": "disabled" }))).into_response()
        }
        Outcome::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthorized" })),
        )
            .into_response(),
        Outcome::RateLimited => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "rate limited" })),
        )
            .into_response(),
        Outcome::Error => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "internal error" })),
        )
            .into_response(),
    }
}
