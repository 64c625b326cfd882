//! Sliding-window admission control over a shared counter store.
//!
//! Each (author, project, resource) pair gets its own bucket in the store;
//! admissions are scored by insertion time and age out of the window rather
//! than being explicitly deleted. The limiter is an abuse guard, not a
//! correctness-critical resource: when the store is unreachable it fails
//! open and logs the fault.

pub mod limiter;
pub mod memory;
pub mod redis;
pub mod store;

pub use self::redis::RedisCounterStore;
pub use limiter::{rate_limit_key, RateLimitConfig, RateLimiter};
pub use memory::InMemoryCounterStore;
pub use store::{CounterStore, StoreError};
