//! Tool-provider boundary

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::error::{ConnectResult, InvokeResult};
use crate::config::ProviderSettings;
use crate::types::ToolSpec;

/// A connected tool provider
///
/// One handle is shared by every concurrent call into the provider.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Provider identity; namespace prefix of its tools
    fn id(&self) -> &str;

    /// Tools currently offered, with unqualified names
    async fn list_tools(&self) -> InvokeResult<Vec<ToolSpec>>;

    /// Invoke a tool by its unqualified name
    async fn invoke(&self, tool: &str, arguments: Value) -> InvokeResult<Value>;

    /// Cheap liveness probe
    async fn healthcheck(&self) -> InvokeResult<()>;
}

/// Performs the handshake that yields a `ToolProvider`
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, settings: &ProviderSettings) -> ConnectResult<Arc<dyn ToolProvider>>;
}
