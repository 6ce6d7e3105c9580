//! `LanguageModel` backed by the genai crate

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

use genai::chat::{ChatRequest, ChatStreamEvent};
use genai::Client;

use super::error::{ModelError, ModelResult};
use super::genai_adapter::{
    create_client, from_genai_tool_call, to_genai_messages, to_genai_options, to_genai_tool, WireNames,
};
use super::traits::{LanguageModel, ModelReply, ModelRequest};
use crate::config::ModelSettings;
use crate::logging::Logger;
use crate::types::CancellationToken;

/// Streams a chat completion through genai and folds it into one reply
pub struct GenaiModel {
    settings: ModelSettings,
    client: Client,
    logger: Arc<dyn Logger>,
}

impl GenaiModel {
    pub fn new(settings: ModelSettings, logger: Arc<dyn Logger>) -> Self {
        let client = create_client(&settings);
        Self {
            settings,
            client,
            logger,
        }
    }

    /// Model name without a "provider/" prefix
    pub fn model_name(&self) -> &str {
        let model = self.settings.model.as_str();
        model.split_once('/').map(|(_, name)| name).unwrap_or(model)
    }
}

#[async_trait]
impl LanguageModel for GenaiModel {
    fn name(&self) -> &str {
        &self.settings.model
    }

    async fn complete(&self, request: ModelRequest, cancel: CancellationToken) -> ModelResult<ModelReply> {
        let provider = self.settings.provider.as_str();
        self.logger.info(&format!(
            "[GenaiModel] complete: provider={}, model={}, messages={}, tools={}",
            provider,
            self.model_name(),
            request.messages.len(),
            request.tools.len()
        ));

        let names = WireNames::new(&request.tools);
        let system = request.system.as_deref().or(self.settings.system_prompt.as_deref());
        let messages = to_genai_messages(system, request.messages, &names)?;

        let mut chat_req = ChatRequest::new(messages);
        if !request.tools.is_empty() {
            chat_req = chat_req.with_tools(request.tools.iter().map(|t| to_genai_tool(t, &names)).collect::<Vec<_>>());
        }
        let options = to_genai_options(&self.settings);

        let response = self
            .client
            .exec_chat_stream(self.model_name(), chat_req, Some(&options))
            .await
            .map_err(|e| ModelError::classify(provider, e.to_string()))?;

        let mut stream = response.stream;
        let mut reply = ModelReply::default();

        while let Some(result) = stream.next().await {
            if cancel.is_cancelled() {
                self.logger.info("[GenaiModel] Stream cancelled");
                return Err(ModelError::Cancelled);
            }

            match result {
                Ok(ChatStreamEvent::Chunk(chunk)) => reply.text.push_str(&chunk.content),
                Ok(ChatStreamEvent::ToolCallChunk(_)) => {
                    self.logger.debug("[GenaiModel] Stream event: ToolCallChunk");
                }
                Ok(ChatStreamEvent::End(end)) => {
                    if let Some(tool_calls) = end.captured_tool_calls() {
                        reply.tool_calls = tool_calls
                            .iter()
                            .map(|tc| from_genai_tool_call(tc, &names))
                            .collect();
                    }
                    self.logger.debug(&format!(
                        "[GenaiModel] Stream event: End ({} tool calls)",
                        reply.tool_calls.len()
                    ));
                }
                Ok(_) => {}
                Err(e) => {
                    self.logger.error(&format!("[GenaiModel] Stream error: {}", e));
                    return Err(ModelError::classify(provider, e.to_string()));
                }
            }
        }

        if let Some(call) = reply.tool_calls.iter().find(|c| c.id.is_empty() || c.name.is_empty()) {
            return Err(ModelError::invalid_response(
                provider,
                format!("tool call missing id or name: {:?}", call),
            ));
        }
        if reply.text.is_empty() && reply.tool_calls.is_empty() {
            return Err(ModelError::invalid_response(provider, "empty reply"));
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NoOpLogger;

    fn model(name: &str) -> GenaiModel {
        let settings = ModelSettings {
            model: name.to_string(),
            api_key: Some("sk-test".to_string()),
            ..ModelSettings::default()
        };
        GenaiModel::new(settings, Arc::new(NoOpLogger::new()))
    }

    #[test]
    fn test_model_name_strips_provider_prefix() {
        assert_eq!(model("anthropic/claude-3-haiku-20240307").model_name(), "claude-3-haiku-20240307");
        assert_eq!(model("claude-3-haiku-20240307").model_name(), "claude-3-haiku-20240307");
    }

    #[test]
    fn test_name_is_configured_model() {
        assert_eq!(model("claude-3-haiku-20240307").name(), "claude-3-haiku-20240307");
    }
}
