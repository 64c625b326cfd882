//! Redis-backed counter store.
//!
//! Buckets are sorted sets (`ZADD`/`ZCARD`/`ZREMRANGEBYSCORE`) with a TTL.
//! The admission fast path runs as a single Lua script so that prune, count,
//! insert, and expire are atomic per key; concurrent admissions for the same
//! key serialize inside Redis rather than in-process.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tokio::time::timeout;

use super::store::{CounterStore, StoreError};

/// Prune expired members, reject at the limit, otherwise record the
/// admission and refresh the TTL. Returns 1 on admission, 0 on rejection.
const ADMIT_SCRIPT: &str = r#"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', '(' .. ARGV[1])
local count = redis.call('ZCARD', KEYS[1])
if count >= tonumber(ARGV[2]) then
    return 0
end
redis.call('ZADD', KEYS[1], ARGV[3], ARGV[4])
redis.call('EXPIRE', KEYS[1], ARGV[5])
return 1
"#;

/// A counter store backed by Redis sorted sets.
#[derive(Clone)]
pub struct RedisCounterStore {
    client: redis::Client,
    prefix: String,
    op_timeout: Duration,
}

impl RedisCounterStore {
    /// Creates a store from a Redis URL.
    ///
    /// `prefix` namespaces all bucket keys; `op_timeout` bounds every
    /// round-trip (a timed-out call surfaces as [`StoreError::Timeout`] and
    /// the limiter fails open).
    pub fn new(url: &str, prefix: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(RedisCounterStore {
            client,
            prefix: prefix.to_string(),
            op_timeout,
        })
    }

    fn bucket_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        match timeout(
            self.op_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(StoreError::Unavailable(e.to_string())),
            Err(_) => Err(StoreError::Timeout),
        }
    }

    async fn run<T>(
        &self,
        fut: impl std::future::Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, StoreError> {
        match timeout(self.op_timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(StoreError::Unavailable(e.to_string())),
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("prefix", &self.prefix)
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn remove_older_than(&self, key: &str, cutoff: u64) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let bucket = self.bucket_key(key);
        // Exclusive upper bound: entries scored exactly at the cutoff stay.
        let max = format!("({cutoff}");
        self.run(async {
            conn.zrembyscore::<_, _, _, i64>(&bucket, "-inf", &max)
                .await
        })
        .await?;
        Ok(())
    }

    async fn count(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        let bucket = self.bucket_key(key);
        let n: i64 = self.run(async { conn.zcard(&bucket).await }).await?;
        Ok(n.max(0) as u64)
    }

    async fn insert(&self, key: &str, score: u64, member: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let bucket = self.bucket_key(key);
        self.run(async { conn.zadd::<_, _, _, i64>(&bucket, member, score).await })
            .await?;
        Ok(())
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let bucket = self.bucket_key(key);
        self.run(async { conn.expire::<_, bool>(&bucket, seconds as i64).await })
            .await?;
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
        let mut conn = self.connection().await?;
        let bucket = self.bucket_key(key);
        let script = Script::new(ADMIT_SCRIPT);
        let admitted: i64 = self
            .run(
                script
                    .key(&bucket)
                    .arg(cutoff)
                    .arg(limit)
                    .arg(score)
                    .arg(member)
                    .arg(ttl_seconds)
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(admitted == 1)
    }
}
