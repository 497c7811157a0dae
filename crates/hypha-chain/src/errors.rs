//! Error types for chain execution.

use thiserror::Error;

/// Failure raised by a task handler or plugin.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// The handler ran and failed.
    #[error("{0}")]
    Failed(String),
    /// A dependency the handler needs (model service, cache) was unreachable.
    #[error("dependency unavailable: {0}")]
    Unavailable(String),
}

/// Failure of one step. Recorded in the history, never propagated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepError {
    /// The resolved handler returned an error.
    #[error("{target} failed: {source}")]
    Handler {
        /// Step target that was invoked.
        target: String,
        /// Underlying handler error.
        #[source]
        source: TaskError,
    },
    /// The handler panicked. The panic is contained to this step.
    #[error("{target} panicked: {message}")]
    Panicked {
        /// Step target that was invoked.
        target: String,
        /// Panic payload, if it was a string.
        message: String,
    },
    /// No plugin is registered under the step's target.
    #[error("unknown plugin: {name}")]
    UnknownPlugin {
        /// The unresolved name.
        name: String,
    },
}

/// Contract violation at the chain boundary. Returned before any step runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// A step failed validation.
    #[error("invalid step {index}: {reason}")]
    InvalidStep {
        /// Zero-based position of the offending step.
        index: usize,
        /// What was wrong with it.
        reason: String,
    },
    /// More steps than the executor accepts.
    #[error("chain has {len} steps, at most {max} allowed")]
    TooManySteps {
        /// Steps submitted.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_error_display_includes_target() {
        let err = StepError::Handler {
            target: "echo".into(),
            source: TaskError::Failed("boom".into()),
        };
        assert_eq!(err.to_string(), "echo failed: boom");
    }

    #[test]
    fn unavailable_display() {
        let err = TaskError::Unavailable("model service".into());
        assert_eq!(err.to_string(), "dependency unavailable: model service");
    }

    #[test]
    fn invalid_step_display() {
        let err = ChainError::InvalidStep {
            index: 2,
            reason: "empty target".into(),
        };
        assert_eq!(err.to_string(), "invalid step 2: empty target");
    }
}
