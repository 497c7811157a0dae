//! Task handler lookup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hypha_safety::SafetyCoordinator;
use parking_lot::RwLock;
use tracing::debug;

use crate::errors::TaskError;

/// A named task the agent executor can dispatch to.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the task on `prompt`.
    async fn invoke(&self, prompt: &str) -> Result<String, TaskError>;
}

/// Resolves step targets to handlers.
pub trait TaskRegistry: Send + Sync {
    /// Look up a handler. Names are matched case-insensitively.
    fn resolve(&self, name: &str) -> Option<Arc<dyn TaskHandler>>;
}

/// In-memory [`TaskRegistry`].
///
/// When built with a coordinator, registration is mirrored into its
/// active-task set.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
    safety: Option<Arc<SafetyCoordinator>>,
}

impl HandlerRegistry {
    /// Registry that does not report to a coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that mirrors registrations into `safety`.
    pub fn with_coordinator(safety: Arc<SafetyCoordinator>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            safety: Some(safety),
        }
    }

    /// Register `handler` under `name`, replacing any previous handler.
    pub fn register(&self, name: &str, handler: Arc<dyn TaskHandler>) {
        let key = name.to_lowercase();
        let _ = self.handlers.write().insert(key.clone(), handler);
        if let Some(safety) = &self.safety {
            safety.register_task(key.clone());
        }
        debug!(task = %key, "handler registered");
    }

    /// Remove a handler. Returns `true` if one was registered.
    pub fn unregister(&self, name: &str) -> bool {
        let key = name.to_lowercase();
        let removed = self.handlers.write().remove(&key).is_some();
        if removed {
            if let Some(safety) = &self.safety {
                safety.unregister_task(&key);
            }
        }
        removed
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl TaskRegistry for HandlerRegistry {
    fn resolve(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.read().get(&name.to_lowercase()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    #[async_trait]
    impl TaskHandler for Upper {
        async fn invoke(&self, prompt: &str) -> Result<String, TaskError> {
            Ok(prompt.to_uppercase())
        }
    }

    #[tokio::test]
    async fn resolve_is_case_insensitive() {
        let reg = HandlerRegistry::new();
        reg.register("Upper", Arc::new(Upper));
        let handler = reg.resolve("UPPER").unwrap();
        assert_eq!(handler.invoke("abc").await.unwrap(), "ABC");
        assert!(reg.resolve("lower").is_none());
    }

    #[test]
    fn registration_mirrors_into_coordinator() {
        let safety = Arc::new(SafetyCoordinator::new());
        let reg = HandlerRegistry::with_coordinator(safety.clone());
        reg.register("Echo", Arc::new(Upper));
        assert!(safety.list_active_tasks().contains("echo"));

        assert!(reg.unregister("ECHO"));
        assert!(!safety.list_active_tasks().contains("echo"));
        assert!(!reg.unregister("echo"));
    }

    #[test]
    fn names_sorted() {
        let reg = HandlerRegistry::new();
        reg.register("b", Arc::new(Upper));
        reg.register("a", Arc::new(Upper));
        assert_eq!(reg.names(), vec!["a", "b"]);
    }
}
