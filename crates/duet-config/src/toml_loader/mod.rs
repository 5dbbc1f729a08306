//! TOML config file loading and creation.

mod loader;
mod paths;
mod template;

#[cfg(test)]
mod tests;

pub use loader::{apply_env_overrides, load_from_path, load_from_source};
pub use paths::{
    create_default_config, default_config_path, resolve_config_path, ConfigSource, CONFIG_PATH_ENV,
};
