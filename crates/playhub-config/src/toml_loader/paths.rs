//! Where the config file lives, and writing the documented default.

use std::path::{Path, PathBuf};

use playhub_common::ConfigError;
use tracing::info;

use super::template::default_config_toml;

/// Overrides the platform location when set and non-empty.
pub const CONFIG_PATH_ENV: &str = "PLAYHUB_CONFIG";

/// `$PLAYHUB_CONFIG`, else `<platform config dir>/playhub/config.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("playhub").join("config.toml"))
        .ok_or_else(|| ConfigError::ParseError("no platform config directory".into()))
}

fn io_failure(action: &str, path: &Path, err: std::io::Error) -> ConfigError {
    ConfigError::ParseError(format!("failed to {action} {}: {err}", path.display()))
}

/// Write the commented default template to `path`, creating parent
/// directories as needed.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_failure("create config directory", dir, e))?;
    }
    std::fs::write(path, default_config_toml())
        .map_err(|e| io_failure("write default config to", path, e))?;
    info!(path = %path.display(), "created default config");
    Ok(())
}
