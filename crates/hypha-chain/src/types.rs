//! Chain step, result, and per-run context types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One unit of chain work.
///
/// Also accepts the `agent`/`prompt` and `plugin`/`input` field names older
/// clients send.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainStep {
    /// Task or plugin name.
    #[serde(alias = "agent", alias = "plugin")]
    pub target: String,
    /// Prompt or input text handed to the target.
    #[serde(default, alias = "prompt", alias = "input")]
    pub payload: String,
    /// Free-form parameters for the target.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
}

impl ChainStep {
    /// Step with no parameters.
    pub fn new(target: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            payload: payload.into(),
            parameters: Map::new(),
        }
    }

    /// Attach a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        let _ = self.parameters.insert(key.into(), value);
        self
    }
}

/// Recorded outcome of one step.
///
/// Exactly one of `output` / `error` is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// The step as submitted.
    pub step: ChainStep,
    /// Output on success.
    pub output: Option<String>,
    /// Failure message otherwise.
    pub error: Option<String>,
}

impl StepResult {
    /// Successful step.
    pub fn success(step: ChainStep, output: String) -> Self {
        Self {
            step,
            output: Some(output),
            error: None,
        }
    }

    /// Failed step.
    pub fn failure(step: ChainStep, error: String) -> Self {
        Self {
            step,
            output: None,
            error: Some(error),
        }
    }

    /// Whether the step produced an output.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Ordered results of one chain run, in input order.
pub type ChainHistory = Vec<StepResult>;

/// State shared between the steps of a single run.
///
/// Created by [`crate::ChainExecutor::run`] and dropped when the run ends.
#[derive(Clone, Debug, Default)]
pub struct ChainContext {
    outputs: Vec<Option<String>>,
    values: Map<String, Value>,
}

impl ChainContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of the step that just finished.
    pub fn record(&mut self, output: Option<&str>) {
        self.outputs.push(output.map(str::to_owned));
    }

    /// Output of the step at `index`, if it succeeded.
    pub fn output(&self, index: usize) -> Option<&str> {
        self.outputs.get(index).and_then(Option::as_deref)
    }

    /// Most recent successful output.
    pub fn last_output(&self) -> Option<&str> {
        self.outputs.iter().rev().find_map(Option::as_deref)
    }

    /// Number of steps completed so far.
    pub fn completed(&self) -> usize {
        self.outputs.len()
    }

    /// Store a named value for later steps.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let _ = self.values.insert(key.into(), value);
    }

    /// Named value set by an earlier step.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}
