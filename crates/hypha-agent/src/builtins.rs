//! Tasks and plugins registered at startup.
//!
//! These run locally with no external service. Deployments that need real
//! agents register their own [`TaskHandler`]s next to these.

use std::sync::Arc;

use async_trait::async_trait;
use hypha_chain::{HandlerRegistry, Plugin, PluginRegistry, TaskError, TaskHandler};
use serde_json::{Map, Value};

/// Returns the prompt unchanged.
struct Echo;

#[async_trait]
impl TaskHandler for Echo {
    async fn invoke(&self, prompt: &str) -> Result<String, TaskError> {
        Ok(prompt.to_owned())
    }
}

/// Counts whitespace-separated words.
struct WordCount;

#[async_trait]
impl TaskHandler for WordCount {
    async fn invoke(&self, prompt: &str) -> Result<String, TaskError> {
        Ok(prompt.split_whitespace().count().to_string())
    }
}

struct Uppercase;

#[async_trait]
impl Plugin for Uppercase {
    async fn execute(
        &self,
        input: &str,
        _parameters: &Map<String, Value>,
    ) -> Result<String, TaskError> {
        Ok(input.to_uppercase())
    }
}

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

/// Wraps the input with the `prefix` and `suffix` string parameters.
struct Wrap;

#[async_trait]
impl Plugin for Wrap {
    async fn execute(
        &self,
        input: &str,
        parameters: &Map<String, Value>,
    ) -> Result<String, TaskError> {
        let part = |key: &str| match parameters.get(key) {
            None => Ok(""),
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(_) => Err(TaskError::Failed(format!("parameter '{key}' must be a string"))),
        };
        Ok(format!("{}{input}{}", part("prefix")?, part("suffix")?))
    }
}

/// Register the built-in tasks.
pub fn register_tasks(registry: &HandlerRegistry) {
    registry.register("echo", Arc::new(Echo));
    registry.register("wordcount", Arc::new(WordCount));
}

/// Register the built-in plugins.
pub fn register_plugins(registry: &PluginRegistry) {
    registry.register("uppercase", Arc::new(Uppercase));
    registry.register("reverse", Arc::new(Reverse));
    registry.register("wrap", Arc::new(Wrap));
}
