//! Configuration structures
//!
//! Every section carries serde defaults, so an empty file yields a usable config.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Tool providers to connect at startup
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    #[serde(default)]
    pub sessions: SessionSettings,
    #[serde(default)]
    pub orchestration: OrchestrationSettings,
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl CourierConfig {
    /// Enabled providers only
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderSettings> {
        self.providers.iter().filter(|p| p.enabled)
    }

    /// Reject configurations the runtime cannot honor
    pub fn validate(&self) -> ConfigResult<()> {
        let separator = &self.registry.separator;
        if separator.is_empty() {
            return Err(ConfigError::Invalid("registry.separator must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return Err(ConfigError::Invalid("provider id must not be empty".into()));
            }
            if provider.id.contains(separator.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "provider id '{}' contains the namespace separator '{}'",
                    provider.id, separator
                )));
            }
            if !seen.insert(provider.id.to_lowercase()) {
                return Err(ConfigError::Invalid(format!("duplicate provider id '{}'", provider.id)));
            }
        }

        if self.dispatch.timeout_secs == 0 {
            return Err(ConfigError::Invalid("dispatch.timeout_secs must be positive".into()));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::Invalid("reconnect.max_attempts must be positive".into()));
        }
        if self.reconnect.base_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigError::Invalid(
                "reconnect.base_delay_ms must not exceed reconnect.max_delay_ms".into(),
            ));
        }
        if self.sessions.max_turns == 0 {
            return Err(ConfigError::Invalid("sessions.max_turns must be positive".into()));
        }
        if self.orchestration.max_tool_rounds == 0 {
            return Err(ConfigError::Invalid("orchestration.max_tool_rounds must be positive".into()));
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}

/// One tool provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Provider identity; also the namespace prefix of its tools
    pub id: String,
    pub transport: TransportSettings,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// If non-empty, only these remote tool names are registered
    #[serde(default)]
    pub include: Vec<String>,
    /// Remote tool names never registered
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl ProviderSettings {
    pub fn new(id: impl Into<String>, transport: TransportSettings) -> Self {
        Self {
            id: id.into(),
            transport,
            enabled: true,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    pub fn with_include(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.include = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclude = names.into_iter().map(Into::into).collect();
        self
    }
}

/// How to reach a tool provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportSettings {
    /// Spawn an MCP server as a child process speaking over stdio
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    /// Streamable HTTP MCP endpoint
    Http { url: String },
    /// Handled by an in-process connector (tests, embedded providers)
    InProcess,
}

/// LLM settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Provider id understood by genai ("anthropic", "openai", ...)
    #[serde(default = "default_model_provider")]
    pub provider: String,
    #[serde(default = "default_model_name")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Attempts after a rate-limited reply before the turn fails
    #[serde(default = "default_rate_limit_retries")]
    pub rate_limit_retries: u32,
}

fn default_model_provider() -> String {
    "anthropic".to_string()
}

fn default_model_name() -> String {
    "claude-3-haiku-20240307".to_string()
}

fn default_max_tokens() -> Option<u32> {
    Some(2048)
}

fn default_rate_limit_retries() -> u32 {
    5
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            model: default_model_name(),
            api_key: None,
            api_key_env: None,
            api_base: None,
            system_prompt: None,
            max_tokens: default_max_tokens(),
            temperature: None,
            rate_limit_retries: default_rate_limit_retries(),
        }
    }
}

impl ModelSettings {
    /// Environment variable consulted when no inline key is set
    pub fn api_key_variable(&self) -> String {
        self.api_key_env
            .clone()
            .unwrap_or_else(|| format!("{}_API_KEY", self.provider.to_uppercase()))
    }

    /// Inline key, else the configured environment variable
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(self.api_key_variable()).ok())
            .filter(|k| !k.is_empty())
    }
}

/// Tool dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Upper bound for one tool call, reconnect and retry included
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DispatchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Provider reconnect backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Session store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Most recent turns retained per user
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_max_turns() -> usize {
    20
}

fn default_idle_timeout_secs() -> u64 {
    3_600
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl SessionSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Turn loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationSettings {
    /// DispatchingTools cycles allowed per turn
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

fn default_max_tool_rounds() -> usize {
    10
}

impl Default for OrchestrationSettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

/// Tool registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Joins provider id and tool name into the qualified name
    #[serde(default = "default_separator")]
    pub separator: String,
}

fn default_separator() -> String {
    ".".to_string()
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            separator: default_separator(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// How often idle sessions are swept and providers healed
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_maintenance_interval_secs() -> u64 {
    300
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}
