//! Chain executor for named agent tasks.

use std::sync::Arc;

use async_trait::async_trait;
use hypha_safety::SafetyCoordinator;
use tracing::{debug, info};

use crate::errors::StepError;
use crate::executor::{ChainExecutor, StepLimits};
use crate::registry::TaskRegistry;
use crate::tracking::tracked_invoke;
use crate::types::{ChainContext, ChainStep};

/// Output of every step while safe mode is on.
pub const HALTED_OUTPUT: &str = "system halted";

/// Output for a step whose target is not registered.
pub fn unknown_target_output(target: &str) -> String {
    format!("unknown target: {target}")
}

/// Dispatches each step to a task handler.
///
/// The safety gate is checked on every step, so toggling safe mode mid-run
/// affects the remaining steps.
pub struct AgentChainExecutor {
    safety: Arc<SafetyCoordinator>,
    registry: Arc<dyn TaskRegistry>,
    limits: StepLimits,
}

impl AgentChainExecutor {
    /// Create an executor with default step limits.
    pub fn new(safety: Arc<SafetyCoordinator>, registry: Arc<dyn TaskRegistry>) -> Self {
        Self {
            safety,
            registry,
            limits: StepLimits::default(),
        }
    }

    /// Replace the step limits.
    #[must_use]
    pub fn with_limits(mut self, limits: StepLimits) -> Self {
        self.limits = limits;
        self
    }
}

#[async_trait]
impl ChainExecutor for AgentChainExecutor {
    fn kind(&self) -> &'static str {
        "agent"
    }

    fn limits(&self) -> StepLimits {
        self.limits
    }

    async fn execute_step(
        &self,
        step: &ChainStep,
        _context: &mut ChainContext,
    ) -> Result<String, StepError> {
        if !self.safety.is_operational() {
            info!(task = %step.target, "dispatch suppressed by safe mode");
            return Ok(HALTED_OUTPUT.to_string());
        }

        let Some(handler) = self.registry.resolve(&step.target) else {
            debug!(task = %step.target, "unknown target");
            return Ok(unknown_target_output(&step.target));
        };

        let name = step.target.to_lowercase();
        tracked_invoke(&name, handler.as_ref(), &step.payload)
            .await
            .map_err(|source| StepError::Handler {
                target: step.target.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::errors::TaskError;
    use crate::registry::{HandlerRegistry, TaskHandler};
    use crate::types::StepResult;

    /// Echoes the prompt and counts invocations.
    #[derive(Default)]
    struct EchoSpy {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TaskHandler for EchoSpy {
        async fn invoke(&self, prompt: &str) -> Result<String, TaskError> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(prompt.to_string())
        }
    }

    struct Broken;

    #[async_trait]
    impl TaskHandler for Broken {
        async fn invoke(&self, _prompt: &str) -> Result<String, TaskError> {
            Err(TaskError::Unavailable("model service".into()))
        }
    }

    /// Registry that counts lookups.
    struct CountingRegistry {
        inner: HandlerRegistry,
        lookups: AtomicUsize,
    }

    impl TaskRegistry for CountingRegistry {
        fn resolve(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
            let _ = self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.resolve(name)
        }
    }

    fn setup() -> (Arc<SafetyCoordinator>, Arc<EchoSpy>, AgentChainExecutor) {
        let safety = Arc::new(SafetyCoordinator::new());
        let spy = Arc::new(EchoSpy::default());
        let registry = HandlerRegistry::with_coordinator(safety.clone());
        registry.register("echo", spy.clone());
        registry.register("broken", Arc::new(Broken));
        let exec = AgentChainExecutor::new(safety.clone(), Arc::new(registry));
        (safety, spy, exec)
    }

    #[tokio::test]
    async fn safe_mode_then_normal_scenario() {
        let (safety, spy, exec) = setup();
        let chain = vec![ChainStep::new("echo", "hi")];

        safety.enable_safe_mode();
        let halted = exec.run(chain.clone()).await.unwrap();
        assert_eq!(
            halted,
            vec![StepResult::success(chain[0].clone(), "system halted".into())]
        );
        assert_eq!(spy.calls.load(Ordering::SeqCst), 0);

        safety.disable_safe_mode();
        let normal = exec.run(chain.clone()).await.unwrap();
        assert_eq!(normal, vec![StepResult::success(chain[0].clone(), "hi".into())]);
        assert_eq!(spy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn safe_mode_never_queries_registry() {
        let safety = Arc::new(SafetyCoordinator::new());
        let spy = Arc::new(EchoSpy::default());
        let inner = HandlerRegistry::new();
        inner.register("echo", spy.clone());
        let registry = Arc::new(CountingRegistry {
            inner,
            lookups: AtomicUsize::new(0),
        });
        let exec = AgentChainExecutor::new(safety.clone(), registry.clone());

        safety.enable_safe_mode();
        let steps = vec![
            ChainStep::new("echo", "a"),
            ChainStep::new("other", "b"),
            ChainStep::new("echo", "c"),
        ];
        let history = exec.run(steps).await.unwrap();

        assert_eq!(history.len(), 3);
        assert!(history
            .iter()
            .all(|r| r.output.as_deref() == Some(HALTED_OUTPUT) && r.error.is_none()));
        assert_eq!(registry.lookups.load(Ordering::SeqCst), 0);
        assert_eq!(spy.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_target_is_an_output_not_an_error() {
        let (_safety, _spy, exec) = setup();
        let history = exec
            .run(vec![ChainStep::new("nobody", "hello")])
            .await
            .unwrap();
        assert_eq!(history[0].output.as_deref(), Some("unknown target: nobody"));
        assert!(history[0].error.is_none());
    }

    #[tokio::test]
    async fn target_resolution_ignores_case() {
        let (_safety, spy, exec) = setup();
        let history = exec.run(vec![ChainStep::new("ECHO", "loud")]).await.unwrap();
        assert_eq!(history[0].output.as_deref(), Some("loud"));
        assert_eq!(spy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_failure_is_recorded_and_chain_continues() {
        let (_safety, spy, exec) = setup();
        let steps = vec![
            ChainStep::new("broken", "x"),
            ChainStep::new("echo", "after"),
        ];
        let history = exec.run(steps).await.unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].output, None);
        assert_eq!(
            history[0].error.as_deref(),
            Some("broken failed: dependency unavailable: model service")
        );
        assert_eq!(history[1].output.as_deref(), Some("after"));
        assert_eq!(spy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_abort_the_run() {
        struct Panics;

        #[async_trait]
        impl TaskHandler for Panics {
            async fn invoke(&self, prompt: &str) -> Result<String, TaskError> {
                let words: Vec<&str> = prompt.split_whitespace().collect();
                Ok(words[3].to_owned())
            }
        }

        let (safety, spy, _) = setup();
        let registry = HandlerRegistry::new();
        registry.register("bad", Arc::new(Panics));
        registry.register("echo", spy.clone());
        let exec = AgentChainExecutor::new(safety, Arc::new(registry));

        let history = exec
            .run(vec![ChainStep::new("bad", "x"), ChainStep::new("echo", "after")])
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0]
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("bad panicked: index out of bounds")));
        assert_eq!(history[1].output.as_deref(), Some("after"));
        assert_eq!(spy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn safe_mode_toggled_mid_chain_applies_to_later_steps() {
        struct Trip(Arc<SafetyCoordinator>);

        #[async_trait]
        impl TaskHandler for Trip {
            async fn invoke(&self, _prompt: &str) -> Result<String, TaskError> {
                self.0.enable_safe_mode();
                Ok("tripped".into())
            }
        }

        let (safety, spy, _) = setup();
        let registry = HandlerRegistry::new();
        registry.register("trip", Arc::new(Trip(safety.clone())));
        registry.register("echo", spy.clone());
        let exec = AgentChainExecutor::new(safety, Arc::new(registry));

        let history = exec
            .run(vec![ChainStep::new("trip", "go"), ChainStep::new("echo", "x")])
            .await
            .unwrap();
        assert_eq!(history[0].output.as_deref(), Some("tripped"));
        assert_eq!(history[1].output.as_deref(), Some(HALTED_OUTPUT));
        assert_eq!(spy.calls.load(Ordering::SeqCst), 0);
    }
}
