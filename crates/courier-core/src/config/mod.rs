//! Runtime configuration
//!
//! - `CourierConfig`: all settings, each section defaulted
//! - `ConfigFile` / `load_config`: YAML file discovery and loading

mod error;
mod file;
mod settings;

pub use error::{ConfigError, ConfigResult};
pub use file::{load_config, parse_yaml, ConfigFile, CONFIG_ENV_VAR};
pub use settings::{
    CourierConfig, DispatchSettings, LogFormat, LoggingSettings, ModelSettings,
    OrchestrationSettings, ProviderSettings, ReconnectSettings, RegistrySettings,
    ServerSettings, SessionSettings, TransportSettings,
};
