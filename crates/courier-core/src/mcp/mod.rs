//! MCP (Model Context Protocol) tool providers
//!
//! Uses the official rmcp SDK to talk to MCP servers over stdio or
//! streamable HTTP, and adapts them to the pool's `ToolProvider` boundary.
//!
//! ```rust,ignore
//! use courier_core::mcp::McpConnector;
//!
//! let connector = Arc::new(McpConnector::new(logger.clone()));
//! let pool = ProviderPool::new(connector, BackoffPolicy::default(), logger);
//! pool.connect(settings).await?;
//! ```

mod client;
mod provider;

pub use client::{McpClient, McpError, McpResult};
pub use provider::{normalize_result, to_tool_spec, McpConnector, McpToolProvider};
