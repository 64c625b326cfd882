//! The counter-store interface backing the rate limiter.
//!
//! The store is an ordered set per key: members scored by insertion time in
//! seconds. Backends provide four primitive operations plus an atomic
//! admission fast path; the Redis backend implements the fast path as a Lua
//! script, the in-memory backend under a single lock.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the counter store. All of them are treated identically by the
/// limiter: log and fail open.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the operation.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer within the configured deadline.
    #[error("counter store timed out")]
    Timeout,
}

/// An ordered-set counter store.
///
/// Scores are seconds since the Unix epoch. Members must be unique per
/// insertion; the limiter guarantees this by appending a random suffix to
/// the millisecond timestamp.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Removes every member of `key` with score strictly below `cutoff`.
    async fn remove_older_than(&self, key: &str, cutoff: u64) -> Result<(), StoreError>;

    /// Counts the members of `key`.
    async fn count(&self, key: &str) -> Result<u64, StoreError>;

    /// Inserts `member` into `key` scored at `score`.
    async fn insert(&self, key: &str, score: u64, member: &str) -> Result<(), StoreError>;

    /// Refreshes the bucket's time-to-live.
    async fn expire(&self, key: &str, seconds: u64) -> Result<(), StoreError>;

    /// The full admission step: prune, count, reject at `limit`, otherwise
    /// insert and refresh the TTL. Returns whether the admission succeeded.
    ///
    /// The default implementation composes the four primitive operations,
    /// which leaves a small double-admission window under concurrent requests
    /// for the same key. Backends that can do better (Redis via a script, the
    /// in-memory store via its lock) override this.
    async fn try_admit(
        &self,
        key: &str,
        cutoff: u64,
        limit: u64,
        score: u64,
        member: &str,
        ttl_seconds: u64,
    ) -> Result<bool, StoreError> {
        self.remove_older_than(key, cutoff).await?;
        if self.count(key).await? >= limit {
            return Ok(false);
        }
        self.insert(key, score, member).await?;
        self.expire(key, ttl_seconds).await?;
        Ok(true)
    }
}
