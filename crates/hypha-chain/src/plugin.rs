//! Chain executor for plugins.
//!
//! Plugins receive the step payload plus its parameters. A step with an
//! empty payload is fed the previous successful step's output, which lets a
//! chain pipe text through several plugins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hypha_safety::SafetyCoordinator;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::info;

use crate::agent::HALTED_OUTPUT;
use crate::errors::{StepError, TaskError};
use crate::executor::{ChainExecutor, StepLimits};
use crate::types::{ChainContext, ChainStep};

/// Context key holding the most recent plugin output.
pub const LAST_PLUGIN_OUTPUT: &str = "last_plugin_output";

/// A named transformation usable as a chain step.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Run the plugin.
    async fn execute(&self, input: &str, parameters: &Map<String, Value>)
    -> Result<String, TaskError>;
}

/// In-memory plugin lookup, case-insensitive.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, Arc<dyn Plugin>>>,
}

impl PluginRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `plugin` under `name`.
    pub fn register(&self, name: &str, plugin: Arc<dyn Plugin>) {
        let _ = self.plugins.write().insert(name.to_lowercase(), plugin);
    }

    /// Look up a plugin.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.read().get(&name.to_lowercase()).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Runs chains of plugin steps.
pub struct PluginChainExecutor {
    safety: Arc<SafetyCoordinator>,
    plugins: Arc<PluginRegistry>,
    limits: StepLimits,
}

impl PluginChainExecutor {
    /// Create an executor. Empty payloads are accepted for piping.
    pub fn new(safety: Arc<SafetyCoordinator>, plugins: Arc<PluginRegistry>) -> Self {
        Self {
            safety,
            plugins,
            limits: StepLimits {
                allow_empty_payload: true,
                ..StepLimits::default()
            },
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
impl ChainExecutor for PluginChainExecutor {
    fn kind(&self) -> &'static str {
        "plugin"
    }

    fn limits(&self) -> StepLimits {
        self.limits
    }

    async fn execute_step(
        &self,
        step: &ChainStep,
        context: &mut ChainContext,
    ) -> Result<String, StepError> {
        if !self.safety.is_operational() {
            info!(plugin = %step.target, "plugin dispatch suppressed by safe mode");
            return Ok(HALTED_OUTPUT.to_string());
        }

        let plugin = self
            .plugins
            .resolve(&step.target)
            .ok_or_else(|| StepError::UnknownPlugin {
                name: step.target.clone(),
            })?;

        let input = if step.payload.is_empty() {
            context.last_output().unwrap_or_default().to_owned()
        } else {
            step.payload.clone()
        };

        let output = plugin
            .execute(&input, &step.parameters)
            .await
            .map_err(|source| StepError::Handler {
                target: step.target.clone(),
                source,
            })?;
        context.set(LAST_PLUGIN_OUTPUT, Value::String(output.clone()));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Reverse;

    #[async_trait]
    impl Plugin for Reverse {
        async fn execute(
            &self,
            input: &str,
            _parameters: &Map<String, Value>,
        ) -> Result<String, TaskError> {
            Ok(input.chars().rev().collect())
        }
    }

    struct Repeat;

    #[async_trait]
    impl Plugin for Repeat {
        async fn execute(
            &self,
            input: &str,
            parameters: &Map<String, Value>,
        ) -> Result<String, TaskError> {
            let times = parameters
                .get("times")
                .and_then(Value::as_u64)
                .ok_or_else(|| TaskError::Failed("missing 'times'".into()))?;
            let times = usize::try_from(times).map_err(|e| TaskError::Failed(e.to_string()))?;
            Ok(input.repeat(times))
        }
    }

    fn executor() -> (Arc<SafetyCoordinator>, PluginChainExecutor) {
        let safety = Arc::new(SafetyCoordinator::new());
        let plugins = Arc::new(PluginRegistry::new());
        plugins.register("reverse", Arc::new(Reverse));
        plugins.register("Repeat", Arc::new(Repeat));
        (safety.clone(), PluginChainExecutor::new(safety, plugins))
    }

    #[tokio::test]
    async fn empty_payload_pipes_previous_output() {
        let (_safety, exec) = executor();
        let steps = vec![
            ChainStep::new("reverse", "abc"),
            ChainStep::new("repeat", "").with_parameter("times", json!(2)),
        ];
        let history = exec.run(steps).await.unwrap();
        assert_eq!(history[0].output.as_deref(), Some("cba"));
        assert_eq!(history[1].output.as_deref(), Some("cbacba"));
    }

    #[tokio::test]
    async fn unknown_plugin_is_a_step_error() {
        let (_safety, exec) = executor();
        let steps = vec![ChainStep::new("missing", "x"), ChainStep::new("reverse", "yz")];
        let history = exec.run(steps).await.unwrap();
        assert_eq!(history[0].error.as_deref(), Some("unknown plugin: missing"));
        assert_eq!(history[1].output.as_deref(), Some("zy"));
    }

    #[tokio::test]
    async fn plugin_failure_recorded() {
        let (_safety, exec) = executor();
        let history = exec.run(vec![ChainStep::new("repeat", "x")]).await.unwrap();
        assert_eq!(history[0].error.as_deref(), Some("repeat failed: missing 'times'"));
    }

    #[tokio::test]
    async fn safe_mode_halts_plugins() {
        let (safety, exec) = executor();
        safety.enable_safe_mode();
        let history = exec.run(vec![ChainStep::new("reverse", "abc")]).await.unwrap();
        assert_eq!(history[0].output.as_deref(), Some(HALTED_OUTPUT));
    }

    #[tokio::test]
    async fn first_step_with_empty_payload_gets_empty_input() {
        let (_safety, exec) = executor();
        let history = exec.run(vec![ChainStep::new("reverse", "")]).await.unwrap();
        assert_eq!(history[0].output.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn execute_step_records_last_output_in_context() {
        let (_safety, exec) = executor();
        let mut ctx = ChainContext::new();
        let out = exec
            .execute_step(&ChainStep::new("reverse", "ab"), &mut ctx)
            .await
            .unwrap();
        assert_eq!(out, "ba");
        assert_eq!(ctx.get(LAST_PLUGIN_OUTPUT), Some(&json!("ba")));
    }

    #[test]
    fn registry_names() {
        let registry = PluginRegistry::new();
        registry.register("Zed", Arc::new(Reverse));
        registry.register("alpha", Arc::new(Reverse));
        assert_eq!(registry.names(), vec!["alpha", "zed"]);
        assert!(registry.resolve("ZED").is_some());
    }
}
