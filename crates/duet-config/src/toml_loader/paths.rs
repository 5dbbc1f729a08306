//! Where the relay's config file lives, and writing the first one.

use std::io::Write;
use std::path::{Path, PathBuf};

use duet_common::ConfigError;
use tracing::info;

use super::template::default_config_toml;

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_PATH_ENV: &str = "DUET_CONFIG";

/// A resolved config file and how it was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub path: PathBuf,
    /// Named by the operator (flag or env). A missing file is then an error
    /// instead of a prompt to write the template.
    pub explicit: bool,
}

/// `~/.config/duet/config.toml` on Linux.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::ParseError("could not determine config directory".into()))?;
    Ok(config_dir.join("duet").join("config.toml"))
}

/// Pick the config file: `explicit`, then `$DUET_CONFIG`, then the platform
/// default.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<ConfigSource, ConfigError> {
    let from_env = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    resolve_with(explicit, from_env, default_config_path)
}

fn resolve_with(
    explicit: Option<&Path>,
    from_env: Option<PathBuf>,
    platform: impl FnOnce() -> Result<PathBuf, ConfigError>,
) -> Result<ConfigSource, ConfigError> {
    let named = explicit
        .map(Path::to_path_buf)
        .or(from_env.filter(|p| !p.as_os_str().is_empty()));
    match named {
        Some(path) => Ok(ConfigSource {
            path,
            explicit: true,
        }),
        None => Ok(ConfigSource {
            path: platform()?,
            explicit: false,
        }),
    }
}

/// Write the commented template to `path`. Never overwrites an existing file.
/// On Unix the file is created owner-only since it carries the token secret.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConfigError::ParseError(format!(
                "failed to create config directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let write_err = |e: std::io::Error| {
        ConfigError::ParseError(format!(
            "failed to write default config to {}: {e}",
            path.display()
        ))
    };
    let mut file = options.open(path).map_err(write_err)?;
    file.write_all(default_config_toml().as_bytes())
        .map_err(write_err)?;

    info!("created default config at {}", path.display());
    Ok(())
}
