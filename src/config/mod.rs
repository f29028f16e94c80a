//! Configuration management for Murmur
//!
//! Configuration is loaded from `~/.murmur/config.json` with environment
//! variable overrides of the form `MURMUR_SECTION_KEY`.

mod types;
pub mod validate;

pub use types::*;

use crate::error::{MurmurError, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;

impl Config {
    /// Returns the Murmur configuration directory path (~/.murmur)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".murmur")
    }

    /// Returns the path to the config file (~/.murmur/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    ///
    /// A missing file yields the defaults. The result is range-checked.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        config.check()?;

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn check(&self) -> Result<()> {
        let errors: Vec<String> = validate::check_ranges(self)
            .into_iter()
            .filter(|d| d.level == validate::DiagnosticLevel::Error)
            .map(|d| d.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(MurmurError::Config(errors.join("; ")))
        }
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        // Queue
        env_parse("MURMUR_QUEUE_COUNT_LIMIT", &mut self.queue.count_limit);
        env_parse(
            "MURMUR_QUEUE_TIME_LIMIT_UPPER_BOUND_MS",
            &mut self.queue.time_limit_upper_bound_ms,
        );

        // Dispatcher
        env_parse(
            "MURMUR_DISPATCHER_POLL_INTERVAL_MS",
            &mut self.dispatcher.poll_interval_ms,
        );

        // Limits
        env_parse(
            "MURMUR_LIMITS_PRIVATE_TOKENS_LIMIT",
            &mut self.limits.private_tokens_limit,
        );
        env_parse(
            "MURMUR_LIMITS_GROUP_GENERIC_TOKENS_LIMIT",
            &mut self.limits.group_generic_tokens_limit,
        );
        env_parse(
            "MURMUR_LIMITS_GROUP_PER_USER_TOKENS_LIMIT",
            &mut self.limits.group_per_user_tokens_limit,
        );

        // Completion
        if let Ok(val) = std::env::var("MURMUR_COMPLETION_GROUP_MODEL") {
            self.completion.group_model = val;
        }
        if let Ok(val) = std::env::var("MURMUR_COMPLETION_PRIVATE_MODEL") {
            self.completion.private_model = val;
        }
        env_parse(
            "MURMUR_COMPLETION_MAX_ATTEMPTS",
            &mut self.completion.max_attempts,
        );

        // Provider
        if let Ok(val) = std::env::var("MURMUR_PROVIDER_API_KEY") {
            self.provider.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("MURMUR_PROVIDER_API_BASE") {
            self.provider.api_base = val;
        }

        // Logging
        if let Ok(val) = std::env::var("MURMUR_LOGGING_LEVEL") {
            self.logging.level = val;
        }
    }
}

/// Overwrite `slot` when the variable is set and parses; ignore it otherwise.
fn env_parse<T: FromStr>(key: &str, slot: &mut T) {
    if let Ok(val) = std::env::var(key) {
        if let Ok(v) = val.parse() {
            *slot = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.queue.count_limit, 4);
        assert_eq!(config.queue.time_limit_upper_bound_ms, 4_000);
        assert_eq!(config.completion.max_attempts, 3);
        assert_eq!(config.completion.max_iterations, 10);
        assert_eq!(config.completion.max_tool_calls, 5);
        assert_eq!(config.attention.ignoring_streak_limit, 10);
        assert_eq!(config.limits.recent_window_secs, 180);
        assert_eq!(config.limits.total_window_secs, 259_200);
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{"limits": {"group_per_user_tokens_limit": 100}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.limits.group_per_user_tokens_limit, 100);
        // Defaults still apply to unspecified fields
        assert_eq!(config.limits.group_per_user_max_other_usage_coeff, 0.8);
        assert_eq!(config.dispatcher.poll_interval_ms, 1_000);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.queue.count_limit, 4);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.completion.private_model = "local-model".to_string();
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.completion.private_model, "local-model");
    }

    #[test]
    fn test_load_rejects_invalid_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"limits": {"group_per_user_max_other_usage_coeff": 1.5}}"#,
        )
        .unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(matches!(err, MurmurError::Config(_)));
    }

    #[test]
    fn test_env_override_parses_numbers() {
        env::set_var("MURMUR_DISPATCHER_POLL_INTERVAL_MS", "250");
        let mut config = Config::default();
        config.apply_env_overrides();
        env::remove_var("MURMUR_DISPATCHER_POLL_INTERVAL_MS");
        assert_eq!(config.dispatcher.poll_interval_ms, 250);
    }

    #[test]
    fn test_env_override_ignores_garbage() {
        env::set_var("MURMUR_QUEUE_COUNT_LIMIT", "many");
        let mut config = Config::default();
        config.apply_env_overrides();
        env::remove_var("MURMUR_QUEUE_COUNT_LIMIT");
        assert_eq!(config.queue.count_limit, 4);
    }

    #[test]
    fn test_config_dir() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(Config::dir(), home.join(".murmur"));
        assert_eq!(Config::path(), home.join(".murmur/config.json"));
    }
}
