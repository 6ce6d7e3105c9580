//! Courier Core
//!
//! Multi-turn tool-calling orchestration for chat assistants. An inbound
//! message is answered by a language model that may call tools offered by
//! several independently connected tool providers.
//!
//! ## Components
//!
//! - `pool`: one live connection per tool provider, reconnect with jittered
//!   backoff, retirement after repeated failure
//! - `tools`: namespaced tool index rebuilt atomically from the pool
//! - `sessions`: per-user turn history, serialized per user
//! - `dispatch`: resolves, validates and runs model-requested tool calls
//! - `agent`: the turn loop tying model and tools together
//!
//! ```rust,ignore
//! use courier_core::{Courier, GenaiModel, McpConnector, InboundMessage, CancellationToken};
//!
//! let connector = Arc::new(McpConnector::new(logger.clone()));
//! let model = Arc::new(GenaiModel::new(config.model.clone(), logger.clone()));
//! let courier = Courier::start(config, connector, model, logger).await?;
//!
//! let report = courier
//!     .handle(InboundMessage::new("+15550001", "add buy milk to my tasks"), CancellationToken::new())
//!     .await?;
//! println!("{}", report.reply());
//! ```

pub mod types;
pub mod logging;
pub mod config;
pub mod pool;
pub mod tools;
pub mod sessions;
pub mod dispatch;
pub mod llm;
pub mod mcp;
pub mod agent;
pub mod runtime;

// Re-export commonly used types
pub use types::{
    CancelOnDrop, CancellationToken, ChatMessage, ContentPart, InboundMessage, MessageContent,
    MessageRole, ToolCallRequest, ToolCallResult, ToolErrorKind, ToolOutcome, ToolSegment,
    ToolSpec, Turn, TurnStatus,
};

pub use logging::{Logger, MemoryLogger, NoOpLogger, TracingLogger};

pub use config::{load_config, ConfigError, CourierConfig, ProviderSettings, TransportSettings};

pub use pool::{
    BackoffPolicy, ConnectError, ConnectionState, Connector, InvokeError, ProviderConnection,
    ProviderPool, ToolProvider,
};

pub use tools::{RegistryError, ToolFilter, ToolRegistry};

pub use sessions::{MemorySessionStore, SessionStore, SessionSummary};

pub use dispatch::ToolDispatcher;

pub use llm::{GenaiModel, LanguageModel, ModelError, ModelReply, ModelRequest, ScriptedModel};

pub use mcp::{McpClient, McpConnector, McpError, McpToolProvider};

pub use agent::{Orchestrator, OrchestratorSettings, TurnError, TurnReport, TurnState};

pub use runtime::{Courier, HealthReport, ProviderHealth, StartupError};
