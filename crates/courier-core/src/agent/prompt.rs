//! Prompt construction from session history

use std::sync::Arc;

use crate::types::{ChatMessage, InboundMessage, ToolSegment, Turn};

/// Messages for one tool round: the calls, then their results
pub fn segment_messages(segment: &ToolSegment) -> [ChatMessage; 2] {
    [
        ChatMessage::assistant_tool_calls(&segment.assistant_text, &segment.calls),
        ChatMessage::tool_results(&segment.results),
    ]
}

fn user_message(text: &str, attachment: Option<&str>) -> ChatMessage {
    match attachment {
        Some(url) => ChatMessage::user_with_attachment(text, url),
        None => ChatMessage::user(text),
    }
}

/// Replay stored turns, oldest first, then the new message
pub fn build_messages(history: &[Arc<Turn>], inbound: &InboundMessage) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 1);
    for turn in history {
        messages.push(user_message(&turn.user_message, turn.attachment.as_deref()));
        for segment in &turn.segments {
            messages.extend(segment_messages(segment));
        }
        if !turn.reply.is_empty() {
            messages.push(ChatMessage::assistant(&turn.reply));
        }
    }
    messages.push(user_message(&inbound.text, inbound.attachment.as_deref()));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageRole, ToolCallRequest, ToolCallResult};
    use serde_json::json;

    #[test]
    fn test_empty_history() {
        let messages = build_messages(&[], &InboundMessage::new("alice", "hi"));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].text(), Some("hi"));
    }

    #[test]
    fn test_history_replays_tool_segments() {
        let mut turn = Turn::new("add buy milk to my tasks", None);
        turn.segments.push(ToolSegment {
            assistant_text: String::new(),
            calls: vec![ToolCallRequest::new("c1", "tasks.addItem", json!({"text": "buy milk"}))],
            results: vec![ToolCallResult::success("c1", json!({"id": 1}))],
        });
        turn.reply = "Added 'buy milk' to your tasks.".into();

        let inbound = InboundMessage::new("alice", "and eggs").with_attachment("https://x/y.jpg");
        let messages = build_messages(&[Arc::new(turn)], &inbound);

        let roles: Vec<MessageRole> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
            ]
        );
        assert_eq!(messages[3].text(), Some("Added 'buy milk' to your tasks."));
        assert_eq!(messages[4].plain_text(), "and eggs");
    }
}
