//! Best-effort outbound notifications.
//!
//! Notifications are fire-and-forget: the orchestrator spawns them on a
//! detached task and the HTTP response never waits for them. Failures are
//! logged and swallowed. The Discord implementation posts a short text
//! message to a webhook; deployments without a webhook URL get the no-op
//! notifier.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::types::PipelineId;

/// What a notification describes.
#[derive(Debug, Clone)]
pub struct NotifyDetails {
    /// Full project path, e.g. `group/project`.
    pub project_path: String,

    /// Username that triggered (or was throttled).
    pub author: String,

    /// Human-readable resource label, e.g. `!5` or `#7`.
    pub resource: String,

    /// The resolved branch, when one exists.
    pub branch: Option<String>,

    /// The started pipeline, for start notifications.
    pub pipeline: Option<PipelineId>,
}

/// Errors from a notification backend. Always logged, never escalated.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification rejected (HTTP {0})")]
    Rejected(u16),
}

/// The outbound notification capability.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Announces a started pipeline.
    async fn notify_pipeline_started(&self, details: &NotifyDetails) -> Result<(), NotifyError>;

    /// Announces a rate-limited request.
    async fn notify_rate_limited(&self, details: &NotifyDetails) -> Result<(), NotifyError>;
}

/// Runs a notification future on a detached task, logging any failure.
///
/// The caller's response must not wait on notification delivery; this is
/// the only way notifications are dispatched.
pub fn dispatch(
    fut: impl std::future::Future<Output = Result<(), NotifyError>> + Send + 'static,
) {
    tokio::spawn(async move {
        if let Err(error) = fut.await {
            warn!(%error, "notification delivery failed");
        }
    });
}

/// A notifier that does nothing. Used when no webhook URL is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_pipeline_started(&self, _: &NotifyDetails) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn notify_rate_limited(&self, _: &NotifyDetails) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Posts short text messages to a Discord webhook.
#[derive(Clone)]
pub struct DiscordNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pipeline-bot/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(DiscordNotifier {
            http,
            webhook_url: webhook_url.into(),
        })
    }

    async fn post(&self, content: String) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(&self.webhook_url)
            .json(&json!({ "content": content }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for DiscordNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Webhook URLs embed a secret token.
        f.debug_struct("DiscordNotifier").finish_non_exhaustive()
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify_pipeline_started(&self, details: &NotifyDetails) -> Result<(), NotifyError> {
        let branch = details.branch.as_deref().unwrap_or("?");
        let pipeline = details
            .pipeline
            .map(|p| p.to_string())
            .unwrap_or_else(|| "?".to_string());
        self.post(format!(
            "Pipeline {pipeline} started on `{}` {} (branch `{branch}`) for @{}",
            details.project_path, details.resource, details.author
        ))
        .await
    }

    async fn notify_rate_limited(&self, details: &NotifyDetails) -> Result<(), NotifyError> {
        self.post(format!(
            "Rate limited: @{} on `{}` {}",
            details.author, details.project_path, details.resource
        ))
        .await
    }
}
