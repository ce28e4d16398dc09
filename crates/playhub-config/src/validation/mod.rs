//! Full configuration validation.
//!
//! Each section has its own check; this orchestrator runs them all and
//! collects every problem into a single `ConfigError`.

mod helpers;
mod sections;

#[cfg(test)]
mod tests;

use crate::schema::PlayhubConfig;
use playhub_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &PlayhubConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    sections::validate_signaling(&mut errors, config);
    sections::validate_voice(&mut errors, config);
    sections::validate_chat(&mut errors, config);
    sections::validate_identity(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
