//! Duet relay configuration.
//!
//! TOML-based configuration with full validation. All sections use
//! sensible defaults so partial configs work out of the box.

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    AuthConfig, CoordinationConfig, DuetConfig, HeartbeatConfig, LogLevel, LoggingConfig,
    ReaperConfig, ReasonPolicy, ServerConfig, Severity, CONFIG_SCHEMA_VERSION, JWT_SECRET_ENV,
};

use std::path::Path;

use duet_common::ConfigError;

/// Load config from `path`, else `$DUET_CONFIG`, else the platform default.
///
/// Environment overrides are applied after the file is read.
pub fn load_config(path: Option<&Path>) -> Result<DuetConfig, ConfigError> {
    let source = toml_loader::resolve_config_path(path)?;
    let mut config = toml_loader::load_from_source(&source)?;
    toml_loader::apply_env_overrides(&mut config);
    validation::validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_schema_version_is_1() {
        assert_eq!(CONFIG_SCHEMA_VERSION, 1);
    }

    #[test]
    fn load_config_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[server]\nport = 9000\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_addr(), "0.0.0.0:9000");
        assert_eq!(config.server.ws_bind_addr(), "0.0.0.0:3001");
    }

    #[test]
    fn load_config_missing_explicit_path_errors() {
        let result = load_config(Some(Path::new("/tmp/duet_missing_relay.toml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn default_log_directive() {
        let config = DuetConfig::default();
        assert_eq!(config.logging.default_directive(), "duet_relay=info");
    }
}
