//! MCP-backed tool providers

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::{CallToolResult, RawContent, Tool};
use serde_json::Value;

use super::client::McpClient;
use crate::config::{ProviderSettings, TransportSettings};
use crate::logging::Logger;
use crate::pool::{ConnectError, ConnectResult, Connector, InvokeError, InvokeResult, ToolProvider};
use crate::types::ToolSpec;
use crate::{log_debug, log_warn};

/// Convert an MCP tool listing entry
pub fn to_tool_spec(provider: &str, tool: &Tool) -> ToolSpec {
    let mut spec = ToolSpec::new(
        provider,
        tool.name.to_string(),
        tool.description.as_deref().unwrap_or_default(),
    )
    .with_input_schema(Value::Object((*tool.input_schema).clone()));

    if let Some(schema) = &tool.output_schema {
        spec = spec.with_output_schema(Value::Object((**schema).clone()));
    }
    spec
}

fn content_text(result: &CallToolResult) -> Vec<String> {
    result
        .content
        .iter()
        .filter_map(|content| match &content.raw {
            RawContent::Text(text) => Some(text.text.clone()),
            _ => None,
        })
        .collect()
}

/// Reduce a call result to one JSON payload.
///
/// Structured content wins. Otherwise a single text block is parsed as JSON
/// when possible and passed as a string when not; several blocks become an
/// array.
pub fn normalize_result(result: CallToolResult) -> InvokeResult<Value> {
    if result.is_error.unwrap_or(false) {
        let text = content_text(&result);
        let message = if text.is_empty() {
            "tool reported an error".to_string()
        } else {
            text.join("\n")
        };
        return Err(InvokeError::Remote(message));
    }

    if let Some(structured) = result.structured_content {
        return Ok(structured);
    }

    let mut blocks: Vec<Value> = result
        .content
        .iter()
        .map(|content| match &content.raw {
            RawContent::Text(text) => {
                serde_json::from_str(&text.text).unwrap_or_else(|_| Value::String(text.text.clone()))
            }
            other => serde_json::to_value(other).unwrap_or(Value::Null),
        })
        .collect();

    Ok(match blocks.len() {
        0 => Value::Null,
        1 => blocks.remove(0),
        _ => Value::Array(blocks),
    })
}

/// One MCP server seen through the `ToolProvider` boundary
pub struct McpToolProvider {
    id: String,
    client: McpClient,
    logger: Arc<dyn Logger>,
}

impl McpToolProvider {
    pub fn new(id: impl Into<String>, client: McpClient, logger: Arc<dyn Logger>) -> Self {
        Self {
            id: id.into(),
            client,
            logger,
        }
    }
}

#[async_trait]
impl ToolProvider for McpToolProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_tools(&self) -> InvokeResult<Vec<ToolSpec>> {
        let tools = self.client.list_tools().await?;
        Ok(tools.iter().map(|tool| to_tool_spec(&self.id, tool)).collect())
    }

    async fn invoke(&self, tool: &str, arguments: Value) -> InvokeResult<Value> {
        let result = self.client.call_tool(tool, arguments).await?;
        let payload = normalize_result(result);
        if let Err(e) = &payload {
            log_debug!(self.logger, "[McpToolProvider] {} reported error: {}", tool, e);
        }
        payload
    }

    async fn healthcheck(&self) -> InvokeResult<()> {
        self.client.list_tools().await?;
        Ok(())
    }
}

/// Opens MCP sessions for stdio and HTTP providers
pub struct McpConnector {
    logger: Arc<dyn Logger>,
}

impl McpConnector {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl Connector for McpConnector {
    async fn connect(&self, settings: &ProviderSettings) -> ConnectResult<Arc<dyn ToolProvider>> {
        let id = settings.id.as_str();
        let client = match &settings.transport {
            TransportSettings::Stdio { command, args, env } => {
                McpClient::connect_stdio(command, args, env, Arc::clone(&self.logger)).await
            }
            TransportSettings::Http { url } => {
                McpClient::connect_http(url, Arc::clone(&self.logger)).await
            }
            TransportSettings::InProcess => {
                log_warn!(
                    self.logger,
                    "[McpConnector] {} uses an in-process transport; nothing to connect",
                    id
                );
                return Err(ConnectError::UnknownProvider(id.to_string()));
            }
        }
        .map_err(|e| ConnectError::handshake(id, e.to_string()))?;

        if let Some(info) = client.server_info() {
            log_debug!(
                self.logger,
                "[McpConnector] {} is {} {}",
                id,
                info.name,
                info.version
            );
        }

        Ok(Arc::new(McpToolProvider::new(id, client, Arc::clone(&self.logger))))
    }
}
