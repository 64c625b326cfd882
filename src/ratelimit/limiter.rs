//! The sliding-window rate limiter.
//!
//! Wraps a [`CounterStore`] with the admission policy: at most
//! `max_requests` admissions per key within a trailing `window_seconds`
//! interval. Store failures are logged and the request is admitted anyway;
//! the limiter guards against abuse, and assistant availability wins over
//! strict enforcement when the store is down. That fail-open behavior is a
//! deliberate policy choice, not an accident.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::store::CounterStore;
use crate::types::ProjectId;

/// Admission-control limits, externally configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum admissions per key within the window.
    pub max_requests: u64,

    /// Length of the trailing window, in seconds.
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            max_requests: 3,
            window_seconds: 900,
        }
    }
}

/// Builds the composite bucket key for a (user, project, resource) triple.
pub fn rate_limit_key(author: &str, project: ProjectId, resource_id: &str) -> String {
    format!("{author}:{project}:{resource_id}")
}

/// Sliding-window admission control.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        RateLimiter { store, config }
    }

    /// Attempts to admit a request for `key` at time `now`.
    ///
    /// Prunes entries older than the window, rejects once the bucket holds
    /// `max_requests` fresher entries, and otherwise records the admission
    /// with the bucket TTL refreshed to the window length. The recorded
    /// member carries a random suffix so concurrent admissions in the same
    /// second never collide.
    ///
    /// Fails open: any store error or timeout admits the request and logs
    /// the fault.
    pub async fn try_admit(&self, key: &str, now: DateTime<Utc>) -> bool {
        let now_secs = now.timestamp().max(0) as u64;
        let cutoff = now_secs.saturating_sub(self.config.window_seconds);
        let member = format!("{}-{}", now.timestamp_millis(), rand::random::<u32>());

        match self
            .store
            .try_admit(
                key,
                cutoff,
                self.config.max_requests,
                now_secs,
                &member,
                self.config.window_seconds,
            )
            .await
        {
            Ok(admitted) => admitted,
            Err(error) => {
                warn!(%error, key, "counter store unavailable, admitting request (fail open)");
                true
            }
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
