//! Per-handler request and latency metrics.
//!
//! [`tracked_invoke`] wraps a single handler call. Recording goes through the
//! `metrics` facade and is a no-op until the binary installs a recorder.

use std::time::Instant;

use metrics::{counter, histogram};

use crate::errors::TaskError;
use crate::registry::TaskHandler;

/// Handler invocations (counter, labels: agent, status).
pub const AGENT_REQUESTS_TOTAL: &str = "agent_requests_total";
/// Handler latency (histogram, labels: agent).
pub const AGENT_LATENCY_SECONDS: &str = "agent_latency_seconds";

/// Invoke `handler` and record its outcome under `name`.
pub async fn tracked_invoke(
    name: &str,
    handler: &dyn TaskHandler,
    prompt: &str,
) -> Result<String, TaskError> {
    let start = Instant::now();
    let result = handler.invoke(prompt).await;
    let status = if result.is_ok() { "success" } else { "error" };
    counter!(AGENT_REQUESTS_TOTAL, "agent" => name.to_owned(), "status" => status).increment(1);
    histogram!(AGENT_LATENCY_SECONDS, "agent" => name.to_owned())
        .record(start.elapsed().as_secs_f64());
    result
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct Fixed(Result<String, TaskError>);

    #[async_trait]
    impl TaskHandler for Fixed {
        async fn invoke(&self, _prompt: &str) -> Result<String, TaskError> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn passes_success_through() {
        let handler = Fixed(Ok("done".into()));
        let out = tracked_invoke("fixed", &handler, "x").await;
        assert_eq!(out, Ok("done".into()));
    }

    #[tokio::test]
    async fn passes_error_through() {
        let handler = Fixed(Err(TaskError::Failed("nope".into())));
        let out = tracked_invoke("fixed", &handler, "x").await;
        assert_eq!(out, Err(TaskError::Failed("nope".into())));
    }

    #[test]
    fn metric_names_are_snake_case() {
        for name in [AGENT_REQUESTS_TOTAL, AGENT_LATENCY_SECONDS] {
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
