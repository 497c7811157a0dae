//! # hypha-ratelimit
//!
//! Per-client, per-endpoint request quotas.
//!
//! [`RateLimiter::check_rate_limit`] derives a client identity from the
//! request, picks the quota for the method and path, and counts the request
//! in a [`CounterStore`]. Counts live outside the limiter so several server
//! processes can share them. If the store is unreachable the limiter fails
//! open.

#![deny(unsafe_code)]

pub mod errors;
pub mod identity;
pub mod limiter;
pub mod store;

#[cfg(feature = "redis")]
pub mod redis_store;

pub use errors::CounterStoreError;
pub use identity::{CredentialVerifier, JwtVerifier, Principal, RequestIdentity, client_identity};
pub use limiter::{QuotaTable, RateDecision, RateLimiter, counter_key};
pub use store::{CounterStore, InMemoryCounterStore};

#[cfg(feature = "redis")]
pub use redis_store::RedisCounterStore;
