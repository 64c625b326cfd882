//! In-memory counter store.
//!
//! Used when no Redis URL is configured (single-instance deployments) and as
//! the test double. A single async mutex over the bucket map makes the
//! admission step atomic; TTLs are enforced lazily on access.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::store::{CounterStore, StoreError};

#[derive(Debug, Default)]
struct Bucket {
    /// (score, member) pairs in insertion order.
    entries: Vec<(u64, String)>,
    expires_at: Option<Instant>,
}

impl Bucket {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A process-local counter store.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries for a key. Test helper.
    pub async fn entry_count(&self, key: &str) -> usize {
        let mut buckets = self.buckets.lock().await;
        match live_bucket(&mut buckets, key) {
            Some(bucket) => bucket.entries.len(),
            None => 0,
        }
    }
}

/// Fetches the bucket for `key`, dropping it first if its TTL has lapsed.
fn live_bucket<'a>(
    buckets: &'a mut HashMap<String, Bucket>,
    key: &str,
) -> Option<&'a mut Bucket> {
    if buckets.get(key).is_some_and(|b| b.is_expired(Instant::now())) {
        buckets.remove(key);
    }
    buckets.get_mut(key)
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn remove_older_than(&self, key: &str, cutoff: u64) -> Result<(), StoreError> {
        let mut buckets = self.buckets.lock().await;
        if let Some(bucket) = live_bucket(&mut buckets, key) {
            bucket.entries.retain(|(score, _)| *score >= cutoff);
        }
        Ok(())
    }

    async fn count(&self, key: &str) -> Result<u64, StoreError> {
        let mut buckets = self.buckets.lock().await;
        Ok(live_bucket(&mut buckets, key).map_or(0, |b| b.entries.len() as u64))
    }

    async fn insert(&self, key: &str, score: u64, member: &str) -> Result<(), StoreError> {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(key.to_string()).or_default();
        bucket.entries.push((score, member.to_string()));
        Ok(())
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), StoreError> {
        let mut buckets = self.buckets.lock().await;
        if let Some(bucket) = buckets.get_mut(key) {
            bucket.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
        }
        Ok(())
    }

    async fn try_admit(
        &self,
        key: &str,
        cutoff: u64,
        limit: u64,
        score: u64,
        member: &str,
        ttl_seconds: u64,
    ) -> Result<bool, StoreError> {
        // One lock for the whole step keeps concurrent admissions serialized.
        let mut buckets = self.buckets.lock().await;
        if buckets.get(key).is_some_and(|b| b.is_expired(Instant::now())) {
            buckets.remove(key);
        }
        let bucket = buckets.entry(key.to_string()).or_default();
        bucket.entries.retain(|(s, _)| *s >= cutoff);
        if bucket.entries.len() as u64 >= limit {
            return Ok(false);
        }
        bucket.entries.push((score, member.to_string()));
        bucket.expires_at = Some(Instant::now() + Duration::from_secs(ttl_seconds));
        Ok(true)
    }
}
