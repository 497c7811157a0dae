//! # hypha-logging
//!
//! Installs the global `tracing` subscriber.
//!
//! Log context (client id, chain target, rate-limit identity) travels as
//! structured fields on events and spans. `RUST_LOG` takes precedence over
//! the configured level so a single module can be turned up without
//! touching settings.

#![deny(unsafe_code)]

use tracing_subscriber::EnvFilter;

/// Output format of the stderr subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Single-line human readable output.
    #[default]
    Compact,
    /// One JSON object per line, for log shippers.
    Json,
}

impl LogFormat {
    /// Pick the format from the `logging.json` settings flag.
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Compact }
    }
}

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at application startup. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    init_with_format(level, LogFormat::Compact);
}

/// Initialize the global tracing subscriber emitting JSON lines.
pub fn init_json_subscriber(level: &str) {
    init_with_format(level, LogFormat::Json);
}

/// Initialize the global tracing subscriber in the given format.
pub fn init_with_format(level: &str, format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_for(level))
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init is a no-op if a global subscriber is already set
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_does_not_panic() {
        init_subscriber("warn");
        init_subscriber("debug");
        init_json_subscriber("info");
        tracing::info!("logging initialized");
    }

    #[test]
    fn format_from_flag() {
        assert_eq!(LogFormat::from_json_flag(true), LogFormat::Json);
        assert_eq!(LogFormat::from_json_flag(false), LogFormat::Compact);
        assert_eq!(LogFormat::default(), LogFormat::Compact);
    }

    #[test]
    fn invalid_level_falls_back_to_filter_parse() {
        // EnvFilter::new never panics, unknown directives are dropped
        let _ = filter_for("not-a-level");
    }
}
