//! Counter store errors.

use thiserror::Error;

/// Failure talking to a [`crate::CounterStore`].
#[derive(Debug, Error)]
pub enum CounterStoreError {
    /// The store could not be reached or refused the command.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// Redis driver error.
    #[cfg(feature = "redis")]
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
}
