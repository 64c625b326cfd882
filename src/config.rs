//! Environment-driven service configuration.
//!
//! Loaded once at startup and handed to the components that need it; nothing
//! reads the environment after boot. The `Debug` impl redacts every secret
//! so the config can be logged at startup.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::ratelimit::RateLimitConfig;

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is absent or empty.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// A variable is present but unparsable.
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Service configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,

    /// Shared secret expected in `X-Gitlab-Token`.
    pub webhook_secret: String,

    /// The mention phrase that triggers a run.
    pub trigger_phrase: String,

    /// Base URL of the GitLab instance.
    pub gitlab_url: String,

    /// Access token for branch/pipeline management.
    pub gitlab_token: String,

    /// Token for the pipeline trigger endpoint.
    pub pipeline_trigger_token: String,

    /// Global kill switch; when false every trigger resolves to `disabled`.
    pub bot_enabled: bool,

    /// Whether to cancel superseded pending pipelines after a trigger.
    pub cancel_superseded: bool,

    /// Rate-limit window and ceiling.
    pub rate_limit: RateLimitConfig,

    /// Redis URL for the counter store; in-memory store when unset.
    pub redis_url: Option<String>,

    /// Discord webhook for notifications; no-op notifier when unset.
    pub discord_webhook_url: Option<String>,

    /// Timeout for GitLab and notification HTTP calls.
    pub http_timeout: Duration,

    /// Timeout for counter-store round-trips.
    pub store_timeout: Duration,
}

impl AppConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary lookup (testable seam).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &'static str| get(name).filter(|v| !v.is_empty());

        let listen_addr = match get("LISTEN_ADDR") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
                name: "LISTEN_ADDR",
                reason: format!("{e}"),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 3000)),
        };

        let rate_limit = RateLimitConfig {
            max_requests: parse_or(&get, "RATE_LIMIT_MAX_REQUESTS", 3)?,
            window_seconds: parse_or(&get, "RATE_LIMIT_WINDOW_SECONDS", 900)?,
        };

        Ok(AppConfig {
            listen_addr,
            webhook_secret: get("WEBHOOK_SECRET").ok_or(ConfigError::Missing("WEBHOOK_SECRET"))?,
            trigger_phrase: get("TRIGGER_PHRASE").unwrap_or_else(|| "@claude".to_string()),
            gitlab_url: get("GITLAB_URL").unwrap_or_else(|| "https://gitlab.com".to_string()),
            gitlab_token: get("GITLAB_TOKEN").ok_or(ConfigError::Missing("GITLAB_TOKEN"))?,
            pipeline_trigger_token: get("PIPELINE_TRIGGER_TOKEN")
                .ok_or(ConfigError::Missing("PIPELINE_TRIGGER_TOKEN"))?,
            bot_enabled: parse_bool_or(&get, "BOT_ENABLED", true)?,
            cancel_superseded: parse_bool_or(&get, "CANCEL_SUPERSEDED_PIPELINES", false)?,
            rate_limit,
            redis_url: get("REDIS_URL"),
            discord_webhook_url: get("DISCORD_WEBHOOK_URL"),
            http_timeout: Duration::from_secs(parse_or(&get, "HTTP_TIMEOUT_SECONDS", 30)?),
            store_timeout: Duration::from_millis(parse_or(&get, "STORE_TIMEOUT_MILLIS", 2000)?),
        })
    }
}

fn parse_or(
    get: &impl Fn(&'static str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match get(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
            name,
            reason: format!("{e}"),
        }),
    }
}

fn parse_bool_or(
    get: &impl Fn(&'static str) -> Option<String>,
    name: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match get(name).as_deref() {
        None => Ok(default),
        Some("true") | Some("1") | Some("yes") => Ok(true),
        Some("false") | Some("0") | Some("no") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            name,
            reason: format!("expected a boolean, got {other:?}"),
        }),
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("listen_addr", &self.listen_addr)
            .field("webhook_secret", &"<redacted>")
            .field("trigger_phrase", &self.trigger_phrase)
            .field("gitlab_url", &self.gitlab_url)
            .field("gitlab_token", &"<redacted>")
            .field("pipeline_trigger_token", &"<redacted>")
            .field("bot_enabled", &self.bot_enabled)
            .field("cancel_superseded", &self.cancel_superseded)
            .field("rate_limit", &self.rate_limit)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "<redacted>"))
            .field(
                "discord_webhook_url",
                &self.discord_webhook_url.as_ref().map(|_| "<redacted>"),
            )
            .field("http_timeout", &self.http_timeout)
            .field("store_timeout", &self.store_timeout)
            .finish()
    }
}
