//! Playhub client configuration.
//!
//! TOML-based configuration for the signaling connection, voice sessions,
//! text chat and logging. Every section uses serde defaults so a partial
//! file (or none at all) works out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use playhub_config::{config_to_json, load_config};
//!
//! let config = load_config().expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{PlayhubConfig, CONFIG_SCHEMA_VERSION};

use playhub_common::ConfigError;
use std::path::Path;

/// Load config from the platform default path and validate it.
///
/// Creates a documented default file if none exists yet.
pub fn load_config() -> Result<PlayhubConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Load config from an explicit path and validate it.
pub fn load_config_from(path: &Path) -> Result<PlayhubConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }
    let config = toml_loader::load_from_path(path)?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &PlayhubConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_to_json_contains_all_sections() {
        let json = config_to_json(&PlayhubConfig::default());
        assert!(json.contains("\"signaling\""));
        assert!(json.contains("\"voice\""));
        assert!(json.contains("\"chat\""));
        assert!(json.contains("\"identity\""));
        assert!(json.contains("\"logging\""));
    }

    #[test]
    fn config_to_json_round_trips() {
        let json = config_to_json(&PlayhubConfig::default());
        let parsed: PlayhubConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.signaling.call_timeout_ms, 10_000);
        assert!((parsed.voice.speaking_threshold - 0.02).abs() < f64::EPSILON);
    }

    #[test]
    fn load_config_from_missing_path_is_file_not_found() {
        let err = load_config_from(Path::new("/tmp/playhub_missing_dir/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn load_config_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[voice]\nspeaking_threshold = 3.0\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
