//! Conversion between courier types and genai types
//!
//! Auth comes from the resolved `ModelSettings`, never from genai's own
//! environment lookup.
//!
//! Some APIs only accept `[A-Za-z0-9_-]` in tool names, so qualified names are
//! sent in wire form and mapped back with a `WireNames` table.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use genai::chat::{
    ChatMessage as GenaiMessage, ChatOptions as GenaiOptions, ChatRole as GenaiRole,
    MessageContent as GenaiContent, Tool as GenaiTool, ToolCall as GenaiToolCall,
    ToolResponse as GenaiToolResponse,
};
use genai::resolver::{AuthData, AuthResolver, Endpoint, ServiceTargetResolver};
use genai::{adapter::AdapterKind, Client, ModelIden, ServiceTarget};
use serde_json::json;

use super::error::ModelResult;
use crate::config::ModelSettings;
use crate::types::{
    wire_name, ChatMessage, ContentPart, MessageContent, MessageRole, ToolCallRequest, ToolSpec,
};

// ============================================================================
// Tool names
// ============================================================================

/// Two-way mapping between qualified and wire tool names for one request.
///
/// Wire names are unique within the table; a name whose wire form is already
/// taken gets a numeric suffix.
#[derive(Debug, Default)]
pub struct WireNames {
    by_wire: HashMap<String, String>,
    by_qualified: HashMap<String, String>,
}

impl WireNames {
    pub fn new(tools: &[Arc<ToolSpec>]) -> Self {
        let mut names = Self::default();
        for tool in tools {
            names.insert(&tool.name);
        }
        names
    }

    fn insert(&mut self, qualified: &str) {
        if self.by_qualified.contains_key(qualified) {
            return;
        }
        let base = wire_name(qualified);
        let mut wire = base.clone();
        let mut suffix = 2;
        while self.by_wire.contains_key(&wire) {
            wire = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        self.by_wire.insert(wire.clone(), qualified.to_string());
        self.by_qualified.insert(qualified.to_string(), wire);
    }

    /// Wire name for a qualified name; names outside the table are only sanitized
    pub fn wire(&self, qualified: &str) -> String {
        self.by_qualified
            .get(qualified)
            .cloned()
            .unwrap_or_else(|| wire_name(qualified))
    }

    /// Qualified name for a wire name; unknown names pass through
    pub fn qualified(&self, wire: &str) -> String {
        self.by_wire
            .get(wire)
            .cloned()
            .unwrap_or_else(|| wire.to_string())
    }
}

// ============================================================================
// Message Conversion: courier -> genai
// ============================================================================

/// Convert a role
pub fn to_genai_role(role: MessageRole) -> GenaiRole {
    match role {
        MessageRole::System => GenaiRole::System,
        MessageRole::User => GenaiRole::User,
        MessageRole::Assistant => GenaiRole::Assistant,
    }
}

fn text_message(role: MessageRole, text: String) -> GenaiMessage {
    let content = GenaiContent::from(text);
    match role {
        MessageRole::System => GenaiMessage::system(content),
        MessageRole::User => GenaiMessage::user(content),
        MessageRole::Assistant => GenaiMessage::assistant(content),
    }
}

/// Build a genai tool call from a recorded request
pub fn to_genai_tool_call(call: &ToolCallRequest, names: &WireNames) -> ModelResult<GenaiToolCall> {
    let value = json!({
        "call_id": call.id,
        "fn_name": names.wire(&call.name),
        "fn_arguments": call.arguments,
    });
    Ok(serde_json::from_value(value)?)
}

/// Convert one message.
///
/// Structured messages can expand into several genai messages: the text,
/// then one message carrying the tool calls, or one per tool response.
pub fn to_genai_message(msg: ChatMessage, names: &WireNames) -> ModelResult<Vec<GenaiMessage>> {
    let parts = match msg.content {
        MessageContent::Text(text) => return Ok(vec![text_message(msg.role, text)]),
        MessageContent::Parts(parts) => parts,
    };

    let mut text = Vec::new();
    let mut calls = Vec::new();
    let mut responses = Vec::new();
    for part in parts {
        match part {
            ContentPart::Text { text: t } => text.push(t),
            ContentPart::Attachment { url } => text.push(format!("[Attachment: {}]", url)),
            ContentPart::ToolUse { id, name, input } => {
                calls.push(to_genai_tool_call(&ToolCallRequest::new(id, name, input), names)?);
            }
            ContentPart::ToolResult {
                tool_use_id,
                content,
                ..
            } => responses.push(GenaiToolResponse::new(tool_use_id, content)),
        }
    }

    let mut out = Vec::new();
    if !text.is_empty() {
        out.push(text_message(msg.role, text.join("\n")));
    }
    if !calls.is_empty() {
        out.push(GenaiMessage::from(calls));
    }
    out.extend(responses.into_iter().map(GenaiMessage::from));
    Ok(out)
}

/// Convert a history, with an optional system prompt in front
pub fn to_genai_messages(
    system: Option<&str>,
    messages: Vec<ChatMessage>,
    names: &WireNames,
) -> ModelResult<Vec<GenaiMessage>> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        out.push(GenaiMessage::system(system));
    }
    for msg in messages {
        out.extend(to_genai_message(msg, names)?);
    }
    Ok(out)
}

// ============================================================================
// Tool Conversion: courier -> genai
// ============================================================================

/// Advertise a registered tool under the wire form of its qualified name
pub fn to_genai_tool(spec: &ToolSpec, names: &WireNames) -> GenaiTool {
    GenaiTool::new(names.wire(&spec.name))
        .with_description(&spec.description)
        .with_schema(spec.input_schema.clone())
}

// ============================================================================
// Options / Response Conversion
// ============================================================================

pub fn to_genai_options(settings: &ModelSettings) -> GenaiOptions {
    let mut opts = GenaiOptions::default();

    if let Some(temp) = settings.temperature {
        opts = opts.with_temperature(temp as f64);
    }

    if let Some(max_tokens) = settings.max_tokens {
        opts = opts.with_max_tokens(max_tokens);
    }

    // Tool calls are only reported at stream end when captured
    opts.with_capture_tool_calls(true)
}

pub fn from_genai_tool_call(tc: &GenaiToolCall, names: &WireNames) -> ToolCallRequest {
    ToolCallRequest::new(&tc.call_id, names.qualified(&tc.fn_name), tc.fn_arguments.clone())
}

// ============================================================================
// Client Creation
// ============================================================================

fn adapter_kind(provider: &str) -> Option<AdapterKind> {
    match provider.to_lowercase().as_str() {
        "openai" => Some(AdapterKind::OpenAI),
        "anthropic" => Some(AdapterKind::Anthropic),
        "gemini" | "google" => Some(AdapterKind::Gemini),
        "ollama" => Some(AdapterKind::Ollama),
        "groq" => Some(AdapterKind::Groq),
        "xai" => Some(AdapterKind::Xai),
        "deepseek" => Some(AdapterKind::DeepSeek),
        "cohere" => Some(AdapterKind::Cohere),
        _ => None,
    }
}

/// Create a genai client bound to the configured provider, key and endpoint
pub fn create_client(settings: &ModelSettings) -> Client {
    let api_key = settings.resolve_api_key();

    let auth_resolver = AuthResolver::from_resolver_async_fn(
        move |_model_iden: ModelIden| -> Pin<Box<dyn Future<Output = genai::resolver::Result<Option<AuthData>>> + Send>> {
            let key = api_key.clone();
            // No key: let genai decide (fine for local providers like Ollama)
            Box::pin(async move { Ok(key.map(AuthData::from_single)) })
        },
    );

    let target_adapter = adapter_kind(&settings.provider);
    let target_api_base = settings.api_base.clone();

    let target_resolver = ServiceTargetResolver::from_resolver_fn(
        move |target: ServiceTarget| -> Result<ServiceTarget, genai::resolver::Error> {
            let ServiceTarget {
                endpoint,
                auth,
                model,
            } = target;

            let endpoint = target_api_base
                .as_ref()
                .map(|base| Endpoint::from_owned(base.clone()))
                .unwrap_or(endpoint);
            let model = match target_adapter {
                Some(kind) => ModelIden::new(kind, model.model_name.clone()),
                None => model,
            };

            Ok(ServiceTarget {
                endpoint,
                auth,
                model,
            })
        },
    );

    Client::builder()
        .with_auth_resolver(auth_resolver)
        .with_service_target_resolver(target_resolver)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCallResult;

    #[test]
    fn test_role_conversion() {
        assert!(matches!(to_genai_role(MessageRole::System), GenaiRole::System));
        assert!(matches!(to_genai_role(MessageRole::User), GenaiRole::User));
        assert!(matches!(
            to_genai_role(MessageRole::Assistant),
            GenaiRole::Assistant
        ));
    }

    #[test]
    fn test_text_message_conversion() {
        let converted = to_genai_message(ChatMessage::user("Hello, world!"), &WireNames::default()).unwrap();
        assert_eq!(converted.len(), 1);
        assert!(matches!(converted[0].role, GenaiRole::User));
    }

    #[test]
    fn test_tool_round_conversion() {
        let calls = vec![
            ToolCallRequest::new("c1", "tasks.addItem", json!({"text": "milk"})),
            ToolCallRequest::new("c2", "tasks.addItem", json!({"text": "eggs"})),
        ];
        let names = WireNames::default();
        let assistant = to_genai_message(ChatMessage::assistant_tool_calls("On it.", &calls), &names).unwrap();
        // Text, then one message carrying both calls
        assert_eq!(assistant.len(), 2);
        assert!(matches!(assistant[0].role, GenaiRole::Assistant));

        let results = vec![
            ToolCallResult::success("c1", json!("ok")),
            ToolCallResult::success("c2", json!("ok")),
        ];
        let responses = to_genai_message(ChatMessage::tool_results(&results), &names).unwrap();
        assert_eq!(responses.len(), 2);
    }

    #[test]
    fn test_system_prompt_goes_first() {
        let messages =
            to_genai_messages(Some("Be brief."), vec![ChatMessage::user("hi")], &WireNames::default()).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0].role, GenaiRole::System));
    }

    #[test]
    fn test_tool_call_names_map_back() {
        let spec = Arc::new(ToolSpec::new("tasks", "addItem", "").qualify("."));
        let names = WireNames::new(&[spec]);

        let call = ToolCallRequest::new("toolu_01", "tasks.addItem", json!({"text": "milk"}));
        let genai_call = to_genai_tool_call(&call, &names).unwrap();
        assert_eq!(genai_call.call_id, "toolu_01");
        assert_eq!(genai_call.fn_name, "tasks_addItem");
        assert_eq!(from_genai_tool_call(&genai_call, &names), call);
    }

    #[test]
    fn test_wire_names_stay_distinct() {
        let specs = vec![
            Arc::new(ToolSpec::new("todo", "list_get", "").qualify(".")),
            Arc::new(ToolSpec::new("todo_list", "get", "").qualify(".")),
        ];
        let names = WireNames::new(&specs);

        let first = names.wire("todo.list_get");
        let second = names.wire("todo_list.get");
        assert_eq!(first, "todo_list_get");
        assert_ne!(first, second);
        assert_eq!(names.qualified(&first), "todo.list_get");
        assert_eq!(names.qualified(&second), "todo_list.get");

        let advertised: Vec<String> = specs.iter().map(|s| to_genai_tool(s, &names).name.to_string()).collect();
        assert_eq!(advertised, vec![first, second]);
    }

    #[test]
    fn test_tool_conversion() {
        let spec = ToolSpec::new("tasks", "addItem", "Add a task")
            .with_input_schema(json!({"type": "object"}))
            .qualify(".");

        let tool = to_genai_tool(&spec, &WireNames::default());
        assert_eq!(tool.name, "tasks_addItem");
    }

    #[test]
    fn test_adapter_kind() {
        assert!(matches!(adapter_kind("Anthropic"), Some(AdapterKind::Anthropic)));
        assert!(adapter_kind("acme").is_none());
    }
}
