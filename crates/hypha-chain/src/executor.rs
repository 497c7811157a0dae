//! The chain driver.
//!
//! Executors supply [`ChainExecutor::execute_step`]; the provided
//! [`ChainExecutor::run`] validates the whole chain, then executes steps one
//! at a time in input order. A failing step is recorded and the run moves on
//! to the next step, so callers always get one [`StepResult`] per step.
//! A panicking step counts as a failed step.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::LazyLock;

use async_trait::async_trait;
use futures::FutureExt;
use regex::Regex;
use tracing::{debug, error, warn};

use crate::errors::{ChainError, StepError};
use crate::types::{ChainContext, ChainHistory, ChainStep, StepResult};

static TARGET_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,50}$").expect("valid regex"));

/// Validation bounds applied to every step before a run starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepLimits {
    /// Maximum number of steps, if bounded.
    pub max_steps: Option<usize>,
    /// Maximum payload length in characters.
    pub max_payload_chars: usize,
    /// Whether an empty payload is acceptable.
    pub allow_empty_payload: bool,
}

impl Default for StepLimits {
    fn default() -> Self {
        Self {
            max_steps: None,
            max_payload_chars: 1000,
            allow_empty_payload: false,
        }
    }
}

impl StepLimits {
    /// Check one step against these limits.
    pub fn check(&self, index: usize, step: &ChainStep) -> Result<(), ChainError> {
        let invalid = |reason: String| ChainError::InvalidStep { index, reason };
        if !TARGET_PATTERN.is_match(&step.target) {
            return Err(invalid(format!(
                "target {:?} must be 1-50 letters, digits, '_' or '-'",
                step.target
            )));
        }
        if !self.allow_empty_payload && step.payload.is_empty() {
            return Err(invalid("payload must not be empty".into()));
        }
        let chars = step.payload.chars().count();
        if chars > self.max_payload_chars {
            return Err(invalid(format!(
                "payload has {chars} characters, at most {} allowed",
                self.max_payload_chars
            )));
        }
        Ok(())
    }

    /// Check a whole chain.
    pub fn check_all(&self, steps: &[ChainStep]) -> Result<(), ChainError> {
        if let Some(max) = self.max_steps {
            if steps.len() > max {
                return Err(ChainError::TooManySteps {
                    len: steps.len(),
                    max,
                });
            }
        }
        steps
            .iter()
            .enumerate()
            .try_for_each(|(index, step)| self.check(index, step))
    }
}

/// A stepwise runner for one kind of target.
#[async_trait]
pub trait ChainExecutor: Send + Sync {
    /// Short name used in logs.
    fn kind(&self) -> &'static str;

    /// Bounds enforced by [`ChainExecutor::run`].
    fn limits(&self) -> StepLimits {
        StepLimits::default()
    }

    /// Execute a single step.
    ///
    /// Business outcomes such as a halted system or an unknown target are
    /// `Ok` outputs. `Err` is recorded in the history as the step's error.
    async fn execute_step(
        &self,
        step: &ChainStep,
        context: &mut ChainContext,
    ) -> Result<String, StepError>;

    /// Run `steps` in order and return one result per step.
    ///
    /// Only validation failures are returned as `Err`; nothing runs in that case.
    async fn run(&self, steps: Vec<ChainStep>) -> Result<ChainHistory, ChainError> {
        self.limits().check_all(&steps)?;
        debug!(kind = self.kind(), steps = steps.len(), "running chain");

        let mut context = ChainContext::new();
        let mut history = ChainHistory::with_capacity(steps.len());

        for (index, step) in steps.into_iter().enumerate() {
            let outcome = AssertUnwindSafe(self.execute_step(&step, &mut context))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let message = panic_message(panic.as_ref());
                    error!(index, task = %step.target, panic = %message, "step panicked");
                    Err(StepError::Panicked {
                        target: step.target.clone(),
                        message,
                    })
                });
            match outcome {
                Ok(output) => {
                    debug!(index, task = %step.target, "step completed");
                    context.record(Some(&output));
                    history.push(StepResult::success(step, output));
                }
                Err(e) => {
                    warn!(index, task = %step.target, error = %e, "step failed");
                    context.record(None);
                    history.push(StepResult::failure(step, e.to_string()));
                }
            }
        }

        Ok(history)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::errors::TaskError;

    /// Fails every step whose payload is "fail", echoes the rest.
    struct Scripted;

    #[async_trait]
    impl ChainExecutor for Scripted {
        fn kind(&self) -> &'static str {
            "scripted"
        }

        async fn execute_step(
            &self,
            step: &ChainStep,
            context: &mut ChainContext,
        ) -> Result<String, StepError> {
            if step.payload == "panic" {
                let empty: Vec<u8> = Vec::new();
                let byte = empty[context.completed() + 3];
                return Ok(byte.to_string());
            }
            if step.payload == "fail" {
                return Err(StepError::Handler {
                    target: step.target.clone(),
                    source: TaskError::Failed("scripted failure".into()),
                });
            }
            Ok(format!("{}#{}", step.payload, context.completed()))
        }
    }

    #[tokio::test]
    async fn empty_chain_returns_empty_history() {
        let history = Scripted.run(Vec::new()).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn failures_do_not_abort_the_chain() {
        let steps = vec![
            ChainStep::new("a", "one"),
            ChainStep::new("b", "fail"),
            ChainStep::new("c", "three"),
            ChainStep::new("d", "fail"),
        ];
        let history = Scripted.run(steps.clone()).await.unwrap();

        assert_eq!(history.len(), 4);
        for (result, step) in history.iter().zip(&steps) {
            assert_eq!(&result.step, step);
        }
        assert_eq!(history[0].output.as_deref(), Some("one#0"));
        assert_eq!(history[1].output, None);
        assert_eq!(history[1].error.as_deref(), Some("b failed: scripted failure"));
        assert_eq!(history[2].output.as_deref(), Some("three#2"));
        assert!(!history[3].is_success());
    }

    #[tokio::test]
    async fn panicking_step_is_recorded_and_chain_continues() {
        let steps = vec![ChainStep::new("bad", "panic"), ChainStep::new("echo", "after")];
        let history = Scripted.run(steps).await.unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].output, None);
        let error = history[0].error.as_deref().unwrap();
        assert!(error.starts_with("bad panicked: index out of bounds"), "{error}");
        assert_eq!(history[1].output.as_deref(), Some("after#1"));
    }

    #[test]
    fn panic_message_variants() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "unknown panic");
    }

    #[tokio::test]
    async fn every_step_failing_still_yields_full_history() {
        let steps: Vec<_> = (0..7).map(|i| ChainStep::new(format!("t{i}"), "fail")).collect();
        let history = Scripted.run(steps).await.unwrap();
        assert_eq!(history.len(), 7);
        assert!(history.iter().all(|r| r.error.is_some() && r.output.is_none()));
    }

    #[tokio::test]
    async fn duplicate_targets_are_kept() {
        let steps = vec![ChainStep::new("echo", "x"), ChainStep::new("echo", "y")];
        let history = Scripted.run(steps).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].output.as_deref(), Some("y#1"));
    }

    #[tokio::test]
    async fn invalid_target_rejected_before_running() {
        let steps = vec![ChainStep::new("ok", "x"), ChainStep::new("bad target!", "y")];
        let err = Scripted.run(steps).await.unwrap_err();
        assert_matches!(err, ChainError::InvalidStep { index: 1, .. });
    }

    #[test]
    fn limits_reject_oversized_payload() {
        let limits = StepLimits {
            max_payload_chars: 3,
            ..StepLimits::default()
        };
        assert!(limits.check(0, &ChainStep::new("t", "äbc")).is_ok());
        assert_matches!(
            limits.check(0, &ChainStep::new("t", "abcd")),
            Err(ChainError::InvalidStep { index: 0, .. })
        );
    }

    #[test]
    fn limits_empty_payload_policy() {
        let strict = StepLimits::default();
        assert!(strict.check(0, &ChainStep::new("t", "")).is_err());
        let lenient = StepLimits {
            allow_empty_payload: true,
            ..StepLimits::default()
        };
        assert!(lenient.check(0, &ChainStep::new("t", "")).is_ok());
    }

    #[test]
    fn limits_max_steps() {
        let limits = StepLimits {
            max_steps: Some(1),
            ..StepLimits::default()
        };
        let steps = vec![ChainStep::new("a", "x"), ChainStep::new("b", "y")];
        assert_matches!(
            limits.check_all(&steps),
            Err(ChainError::TooManySteps { len: 2, max: 1 })
        );
    }

    #[test]
    fn target_pattern_bounds() {
        let limits = StepLimits::default();
        assert!(limits.check(0, &ChainStep::new("a".repeat(50), "x")).is_ok());
        assert!(limits.check(0, &ChainStep::new("a".repeat(51), "x")).is_err());
        assert!(limits.check(0, &ChainStep::new("", "x")).is_err());
        assert!(limits.check(0, &ChainStep::new("neuro-weave_2", "x")).is_ok());
    }
}
