//! # hypha-settings
//!
//! Configuration management with layered sources for the hypha server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HyphaSettings::default()`]
//! 2. **User file**: `~/.hypha/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `HYPHA_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = HyphaSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = HyphaSettings::default();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.server.heartbeat_interval_secs, 30);
        assert_eq!(settings.server.max_chain_steps, 10);
        assert_eq!(settings.rate_limit.window_secs, 60);
        assert_eq!(settings.rate_limit.fallback_limit, 60);
        assert_eq!(settings.rate_limit.method_limits["GET"], 120);
        assert_eq!(settings.rate_limit.method_limits["DELETE"], 30);
        assert_eq!(settings.rate_limit.endpoint_limits["/api/chain/execute"], 30);
        assert!(settings.auth.jwt_secret.is_none());
        assert_eq!(settings.logging.level, "info");
    }
}
