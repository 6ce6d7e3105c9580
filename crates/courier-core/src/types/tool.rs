//! Tool specification and tool-call types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema describing one callable operation offered by a tool provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Name the model sees. Qualified with the provider prefix once registered.
    pub name: String,
    /// Name the owning provider knows this tool by
    #[serde(rename = "remoteName")]
    pub remote_name: String,
    /// Identity of the owning provider
    pub provider: String,
    /// Description of what the tool does
    pub description: String,
    /// JSON Schema for the input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    /// JSON Schema the result payload must satisfy
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

impl ToolSpec {
    /// Create an unqualified tool spec as listed by a provider
    pub fn new(
        provider: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            remote_name: name.clone(),
            name,
            provider: provider.into(),
            description: description.into(),
            input_schema: Value::Object(Default::default()),
            output_schema: None,
        }
    }

    /// Set the input schema
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Set the output schema
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Qualified name for a provider/tool pair
    pub fn qualified_name(provider: &str, remote_name: &str, separator: &str) -> String {
        format!("{}{}{}", provider, separator, remote_name)
    }

    /// Return a copy whose `name` carries the provider prefix
    pub fn qualify(&self, separator: &str) -> Self {
        Self {
            name: Self::qualified_name(&self.provider, &self.remote_name, separator),
            ..self.clone()
        }
    }

    /// `name` as sent to model APIs
    pub fn wire_name(&self) -> String {
        wire_name(&self.name)
    }
}

/// Tool name restricted to `[A-Za-z0-9_-]`; anything else becomes `_`.
///
/// Several model APIs reject other characters in tool names. The mapping is
/// not injective, so the registry refuses names that collide in this form.
pub fn wire_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id assigned by the model response
    pub id: String,
    /// Qualified tool name
    pub name: String,
    /// Named arguments for the tool
    pub arguments: Value,
}

impl ToolCallRequest {
    /// Create a new tool call request
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Get an argument as a string
    pub fn get_arg_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// Classification of a failed tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolErrorKind {
    UnknownTool,
    InvalidArguments,
    Timeout,
    ProviderError,
    MalformedResult,
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ToolErrorKind::UnknownTool => "unknown_tool",
            ToolErrorKind::InvalidArguments => "invalid_arguments",
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::ProviderError => "provider_error",
            ToolErrorKind::MalformedResult => "malformed_result",
        };
        f.write_str(label)
    }
}

/// Failure payload folded back into the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: ToolErrorKind,
    pub message: String,
}

/// Outcome of one tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { payload: Value },
    Failure(ToolFailure),
}

/// Result of one tool call, correlated with its request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// ID of the tool call this is responding to
    #[serde(rename = "callId")]
    pub call_id: String,
    pub outcome: ToolOutcome,
}

impl ToolCallResult {
    /// Create a successful tool result
    pub fn success(call_id: impl Into<String>, payload: Value) -> Self {
        Self {
            call_id: call_id.into(),
            outcome: ToolOutcome::Success { payload },
        }
    }

    /// Create a failed tool result
    pub fn failure(call_id: impl Into<String>, kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            outcome: ToolOutcome::Failure(ToolFailure {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Failure(_))
    }

    /// Failure kind, if this result is a failure
    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        match &self.outcome {
            ToolOutcome::Failure(failure) => Some(failure.kind),
            ToolOutcome::Success { .. } => None,
        }
    }

    /// Render the outcome as the text the model reads
    pub fn to_model_content(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success { payload } => match payload {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            },
            ToolOutcome::Failure(failure) => {
                format!("Error ({}): {}", failure.kind, failure.message)
            }
        }
    }
}
