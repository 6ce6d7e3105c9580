//! Language model boundary

use std::sync::Arc;

use async_trait::async_trait;

use super::error::ModelResult;
use crate::types::{CancellationToken, ChatMessage, ToolCallRequest, ToolSpec};

/// One model query
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub system: Option<String>,
    /// Ordered history, ending with the newest message
    pub messages: Vec<ChatMessage>,
    /// Tools the model may call, by qualified name
    pub tools: Vec<Arc<ToolSpec>>,
}

/// The model's answer: final text, or text so far plus a batch of tool calls
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(text: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            text: text.into(),
            tool_calls: calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A chat model that can request tool calls
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, for logs
    fn name(&self) -> &str;

    /// Send the request and wait for the complete reply
    async fn complete(&self, request: ModelRequest, cancel: CancellationToken) -> ModelResult<ModelReply>;
}
