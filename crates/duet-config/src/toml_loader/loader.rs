//! Core TOML config loading: read from path or platform default.

use crate::schema::{DuetConfig, JWT_SECRET_ENV};
use crate::validation;
use duet_common::ConfigError;
use std::path::Path;
use tracing::{info, warn};

use super::paths::{create_default_config, ConfigSource};

/// Load config from a specific TOML file path.
///
/// Deserializes the file using serde defaults for any missing fields.
/// After loading, the config is validated; if validation fails, a warning
/// is logged and the default config is returned.
pub fn load_from_path(path: &Path) -> Result<DuetConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;

    let config: DuetConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    if let Err(e) = validation::validate(&config) {
        warn!("config validation warning: {e}");
        warn!("falling back to default config");
        return Ok(DuetConfig::default());
    }

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load the file `source` points at. A missing platform-default file is
/// created from the template and defaults are returned; a missing file the
/// operator named is an error.
pub fn load_from_source(source: &ConfigSource) -> Result<DuetConfig, ConfigError> {
    match load_from_path(&source.path) {
        Err(ConfigError::FileNotFound(_)) if !source.explicit => {
            info!("no config found at {}, creating default", source.path.display());
            create_default_config(&source.path)?;
            Ok(DuetConfig::default())
        }
        other => other,
    }
}

/// Apply environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut DuetConfig) {
    if let Ok(secret) = std::env::var(JWT_SECRET_ENV) {
        if !secret.is_empty() {
            config.auth.jwt_secret = secret;
        }
    }
}
