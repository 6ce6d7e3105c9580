//! YAML configuration file
//!
//! Lookup order: explicit path, then `$COURIER_CONFIG`, then
//! `<config_dir>/courier/config.yaml`, then built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};

use super::error::{ConfigError, ConfigResult};
use super::settings::CourierConfig;

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "COURIER_CONFIG";

/// A config file on disk
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// User-level config (~/.config/courier/config.yaml on Linux)
    pub fn user() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".config"));
        Self::new(config_dir.join("courier").join("config.yaml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read, parse and validate the file
    pub fn load(&self) -> ConfigResult<CourierConfig> {
        if !self.exists() {
            return Err(ConfigError::NotFound(self.path.display().to_string()));
        }
        let content = fs::read_to_string(&self.path)?;
        parse_yaml(&content)
    }

    /// Write the config, creating parent directories
    pub fn save(&self, config: &CourierConfig) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_yaml::to_string(config)?)?;
        Ok(())
    }
}

/// Parse and validate a YAML document
pub fn parse_yaml(content: &str) -> ConfigResult<CourierConfig> {
    let config: CourierConfig = if content.trim().is_empty() {
        CourierConfig::default()
    } else {
        serde_yaml::from_str(content)?
    };
    config.validate()?;
    Ok(config)
}

/// Resolve and load configuration.
///
/// An explicit path or `$COURIER_CONFIG` must exist. The user-level file is
/// optional; without it the defaults are returned. The second element is the
/// file that was read, if any.
pub fn load_config(explicit: Option<&Path>) -> ConfigResult<(CourierConfig, Option<PathBuf>)> {
    let env_path = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
    resolve(explicit.map(Path::to_path_buf).or(env_path), ConfigFile::user())
}

fn resolve(
    requested: Option<PathBuf>,
    fallback: ConfigFile,
) -> ConfigResult<(CourierConfig, Option<PathBuf>)> {
    if let Some(path) = requested {
        let file = ConfigFile::new(path);
        let config = file.load()?;
        return Ok((config, Some(file.path)));
    }

    if fallback.exists() {
        let config = fallback.load()?;
        return Ok((config, Some(fallback.path)));
    }

    let config = CourierConfig::default();
    config.validate()?;
    Ok((config, None))
}
