use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};

use super::{types::Config, ConfigError};

/// Names the config file; `config.toml` in the working directory otherwise.
pub const CONFIG_PATH_VAR: &str = "QUEUELINE_CONFIG";

/// Per-key overrides, with `__` between section and key:
/// `QUEUELINE_SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "QUEUELINE_";

/// Where the process should read its config from.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

/// Read `path`, then let `QUEUELINE_*` variables override individual keys.
///
/// A missing file is an error rather than an all-defaults config.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Parse TOML alone, without environment overrides.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
