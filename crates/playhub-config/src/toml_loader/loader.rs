//! Read a config from a path or from the platform default location.

use crate::schema::PlayhubConfig;
use crate::validation;
use playhub_common::ConfigError;
use std::path::Path;
use tracing::{info, warn};

use super::paths::{create_default_config, default_config_path};

/// Load config from a specific TOML file path.
///
/// Missing fields take their defaults. Validation problems are logged as
/// a warning and the parsed config is still returned; callers that need a
/// strict check run [`validation::validate`] themselves.
pub fn load_from_path(path: &Path) -> Result<PlayhubConfig, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;

    let config: PlayhubConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    if let Err(e) = validation::validate(&config) {
        warn!(path = %path.display(), "config validation warning: {e}");
    }

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load config from `$PLAYHUB_CONFIG` or the platform config directory
/// (`~/.config/playhub/config.toml` on Linux).
///
/// A missing file is created from the documented template and the
/// defaults are returned.
pub fn load_default() -> Result<PlayhubConfig, ConfigError> {
    let path = default_config_path()?;

    if !path.exists() {
        info!("no config found at {}, creating default", path.display());
        create_default_config(&path)?;
        return Ok(PlayhubConfig::default());
    }

    load_from_path(&path)
}
