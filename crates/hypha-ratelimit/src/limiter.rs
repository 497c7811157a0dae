//! Quota lookup and the rate check.

use std::collections::HashMap;
use std::sync::Arc;

use hypha_settings::RateLimitSettings;
use metrics::counter;
use serde::Serialize;
use tracing::{error, warn};

use crate::errors::CounterStoreError;
use crate::identity::{CredentialVerifier, RequestIdentity, client_identity};
use crate::store::CounterStore;

/// Requests rejected for exceeding quota (counter, labels: method).
pub const RATE_LIMITED_TOTAL: &str = "rate_limited_total";
/// Checks that failed open because the store errored (counter).
pub const RATE_LIMIT_STORE_ERRORS_TOTAL: &str = "rate_limit_store_errors_total";

/// Static quota tables.
///
/// Lookup order: exact path, then HTTP method, then the fallback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuotaTable {
    endpoint_limits: HashMap<String, u32>,
    method_limits: HashMap<String, u32>,
    fallback: u32,
}

impl QuotaTable {
    /// Tables from settings. Method names are upper-cased.
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self {
            endpoint_limits: settings
                .endpoint_limits
                .iter()
                .map(|(path, limit)| (path.clone(), *limit))
                .collect(),
            method_limits: settings
                .method_limits
                .iter()
                .map(|(method, limit)| (method.to_ascii_uppercase(), *limit))
                .collect(),
            fallback: settings.fallback_limit,
        }
    }

    /// Requests allowed per window for `method` on `path`.
    pub fn limit_for(&self, method: &str, path: &str) -> u32 {
        self.endpoint_limits
            .get(path)
            .or_else(|| self.method_limits.get(&method.to_ascii_uppercase()))
            .copied()
            .unwrap_or(self.fallback)
    }
}

impl Default for QuotaTable {
    fn default() -> Self {
        Self::from_settings(&RateLimitSettings::default())
    }
}

/// Store key for one identity, method and path. The method is upper-cased
/// so `get` and `GET` share a window.
pub fn counter_key(identity: &str, method: &str, path: &str) -> String {
    format!(
        "ratelimit:{identity}:{}:{path}",
        method.to_ascii_uppercase()
    )
}

/// Outcome of one check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Quota that applied.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Seconds until the window resets.
    pub reset_in_secs: u64,
}

/// Per-client, per-endpoint request limiter.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    verifier: Option<Arc<dyn CredentialVerifier>>,
    quotas: QuotaTable,
    window_secs: u64,
}

impl RateLimiter {
    /// Limiter over `store` with the given quotas and window.
    pub fn new(store: Arc<dyn CounterStore>, quotas: QuotaTable, window_secs: u64) -> Self {
        Self {
            store,
            verifier: None,
            quotas,
            window_secs,
        }
    }

    /// Limiter configured from settings.
    pub fn from_settings(store: Arc<dyn CounterStore>, settings: &RateLimitSettings) -> Self {
        Self::new(store, QuotaTable::from_settings(settings), settings.window_secs)
    }

    /// Key authenticated callers by token subject.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Window length in seconds.
    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Count this request and decide whether it may proceed.
    ///
    /// Never fails. A store error is logged and the request is allowed with
    /// `remaining = 0` and a full-window reset.
    pub async fn check_rate_limit(
        &self,
        request: &RequestIdentity,
        method: &str,
        path: &str,
    ) -> RateDecision {
        let identity = client_identity(request, self.verifier.as_deref());
        let limit = self.quotas.limit_for(method, path);
        let method = method.to_ascii_uppercase();
        let method = method.as_str();
        let key = counter_key(&identity, method, path);

        match self.count(&key, limit).await {
            Ok(decision) => {
                if !decision.allowed {
                    warn!(client = %identity, method, path, limit, "rate limit exceeded");
                    counter!(RATE_LIMITED_TOTAL, "method" => method.to_owned()).increment(1);
                }
                decision
            }
            Err(e) => {
                error!(client = %identity, error = %e, "rate limiter store error, allowing request");
                counter!(RATE_LIMIT_STORE_ERRORS_TOTAL).increment(1);
                RateDecision {
                    allowed: true,
                    limit,
                    remaining: 0,
                    reset_in_secs: self.window_secs,
                }
            }
        }
    }

    async fn count(&self, key: &str, limit: u32) -> Result<RateDecision, CounterStoreError> {
        let current = self.store.increment(key).await?;
        if current == 1 {
            self.store.expire(key, self.window_secs).await?;
        }

        // A key left without expiry by an earlier failed EXPIRE would never reset.
        let ttl = self.store.ttl(key).await?;
        let reset_in_secs = match u64::try_from(ttl) {
            Ok(secs) if secs > 0 => secs,
            _ => {
                self.store.expire(key, self.window_secs).await?;
                self.window_secs
            }
        };

        let limit_wide = u64::from(limit);
        if current > limit_wide {
            return Ok(RateDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_in_secs,
            });
        }
        Ok(RateDecision {
            allowed: true,
            limit,
            remaining: u32::try_from(limit_wide - current).unwrap_or(limit),
            reset_in_secs,
        })
    }
}
