//! Conversation turn records

use serde::{Deserialize, Serialize};

use super::tool::{ToolCallRequest, ToolCallResult};

/// One model round that requested tools, with the results it got back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSegment {
    /// Text the model produced alongside the calls
    pub assistant_text: String,
    pub calls: Vec<ToolCallRequest>,
    /// Results in request order
    pub results: Vec<ToolCallResult>,
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    Failed { reason: String },
}

/// One user-message-to-reply exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub user_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    pub segments: Vec<ToolSegment>,
    /// Final assistant text, or the synthesized abort message
    pub reply: String,
    pub status: TurnStatus,
}

impl Turn {
    pub fn new(user_message: impl Into<String>, attachment: Option<String>) -> Self {
        Self {
            user_message: user_message.into(),
            attachment,
            segments: Vec::new(),
            reply: String::new(),
            status: TurnStatus::Completed,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, TurnStatus::Failed { .. })
    }

    /// Total tool calls issued across all segments
    pub fn tool_call_count(&self) -> usize {
        self.segments.iter().map(|s| s.calls.len()).sum()
    }
}
