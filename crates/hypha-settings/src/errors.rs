//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Failure loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid JSON, or the merged document does not fit the
    /// settings schema.
    #[error("invalid settings in {}: {source}", path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
    /// The compiled defaults could not be encoded for merging.
    #[error("cannot encode default settings: {0}")]
    Defaults(#[source] serde_json::Error),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
