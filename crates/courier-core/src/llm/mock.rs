//! Scripted language model for tests
//!
//! Replays a queue of replies and errors in order and records every request.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::{ModelError, ModelResult};
use super::traits::{LanguageModel, ModelReply, ModelRequest};
use crate::logging::Logger;
use crate::types::{CancellationToken, ToolCallRequest};

/// Deterministic `LanguageModel` driven by a script
pub struct ScriptedModel {
    script: Mutex<VecDeque<ModelResult<ModelReply>>>,
    /// Answer once the script runs out
    fallback: Mutex<Option<ModelReply>>,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<ModelRequest>>,
    logger: Arc<dyn Logger>,
}

impl ScriptedModel {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            delay: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            logger,
        }
    }

    /// Queue a final text reply
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(ModelReply::text(text)));
        self
    }

    /// Queue a tool-call reply
    pub fn call_tools(self, text: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        self.push(Ok(ModelReply::tool_calls(text, calls)));
        self
    }

    /// Queue an error
    pub fn fail(self, error: ModelError) -> Self {
        self.push(Err(error));
        self
    }

    /// Answer every request past the script with `reply`
    pub fn repeat(self, reply: ModelReply) -> Self {
        *self.fallback.lock() = Some(reply);
        self
    }

    /// Sleep before answering
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = Some(delay);
        self
    }

    pub fn push(&self, entry: ModelResult<ModelReply>) {
        self.script.lock().push_back(entry);
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ModelRequest, cancel: CancellationToken) -> ModelResult<ModelReply> {
        self.requests.lock().push(request);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(ModelError::Cancelled),
            }
        }

        let next = self.script.lock().pop_front();
        match next {
            Some(entry) => entry,
            None => {
                let fallback = self.fallback.lock().clone();
                fallback.ok_or_else(|| {
                    self.logger.warn("[ScriptedModel] Script exhausted");
                    ModelError::Other("script exhausted".into())
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NoOpLogger;
    use serde_json::json;

    #[tokio::test]
    async fn test_replays_script_in_order() {
        let model = ScriptedModel::new(Arc::new(NoOpLogger::new()))
            .call_tools("", vec![ToolCallRequest::new("c1", "tasks.addItem", json!({}))])
            .reply("done");

        let first = model
            .complete(ModelRequest::default(), CancellationToken::new())
            .await
            .unwrap();
        assert!(first.has_tool_calls());

        let second = model
            .complete(ModelRequest::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(second, ModelReply::text("done"));

        assert!(model
            .complete(ModelRequest::default(), CancellationToken::new())
            .await
            .is_err());
        assert_eq!(model.request_count(), 3);
    }

    #[tokio::test]
    async fn test_fallback_repeats() {
        let model = ScriptedModel::new(Arc::new(NoOpLogger::new())).repeat(ModelReply::text("again"));
        for _ in 0..3 {
            let reply = model
                .complete(ModelRequest::default(), CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(reply.text, "again");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_delay() {
        let model = ScriptedModel::new(Arc::new(NoOpLogger::new()))
            .with_delay(Duration::from_secs(10))
            .reply("too late");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = model.complete(ModelRequest::default(), cancel).await;
        assert!(matches!(result, Err(ModelError::Cancelled)));
    }
}
