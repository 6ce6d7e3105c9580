//! Turn loop
//!
//! Drives one user message to a final reply: query the model, run any tool
//! calls it asks for, feed the results back, and repeat until it answers in
//! plain text or the round limit is hit.
//!
//! Tool calls in one batch run concurrently with no ordering guarantee. A
//! model that needs one call to happen before another has to issue them in
//! separate rounds.

use std::sync::Arc;

use serde::Serialize;

use super::error::{TurnError, TurnResult};
use super::prompt;
use super::state::TurnState;
use crate::config::CourierConfig;
use crate::dispatch::ToolDispatcher;
use crate::llm::{LanguageModel, ModelError, ModelReply, ModelRequest};
use crate::logging::Logger;
use crate::pool::BackoffPolicy;
use crate::sessions::SessionStore;
use crate::types::{CancellationToken, ChatMessage, InboundMessage, ToolSegment, Turn, TurnStatus};
use crate::{log_debug, log_error, log_info, log_warn};

/// Reply sent when the model fails
pub const MODEL_FAILURE_REPLY: &str =
    "I apologize, but I'm having trouble completing that request. Please try again.";

/// Reply sent when a turn runs out of tool rounds
pub const TURN_LIMIT_REPLY: &str =
    "Sorry, that request needed more steps than I can take at once, so I stopped. Could you split it into smaller requests?";

/// Reply sent when the model keeps rate limiting after every retry
pub const RATE_LIMIT_REPLY: &str = "Too many requests right now. Please wait a minute and try again.";

/// Reply sent when the model rejects our credentials
pub const AUTH_FAILURE_REPLY: &str = "Authentication with the assistant service failed. Please contact support.";

/// Reply sent when the model does not answer in time
pub const TIMEOUT_REPLY: &str = "The request took too long. Please try again.";

/// User-facing text for a turn that ends as `Failed`
pub fn failure_reply(error: &TurnError) -> &'static str {
    match error {
        TurnError::TurnLimitExceeded { .. } => TURN_LIMIT_REPLY,
        TurnError::Model(ModelError::RateLimited { .. }) => RATE_LIMIT_REPLY,
        TurnError::Model(ModelError::Auth { .. }) => AUTH_FAILURE_REPLY,
        TurnError::Model(ModelError::Timeout { .. }) => TIMEOUT_REPLY,
        _ => MODEL_FAILURE_REPLY,
    }
}

/// Turn loop settings
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub system_prompt: Option<String>,
    /// DispatchingTools cycles allowed per turn
    pub max_tool_rounds: usize,
    /// Extra attempts after a rate-limited model reply
    pub rate_limit_retries: u32,
    pub rate_limit_backoff: BackoffPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&CourierConfig::default())
    }
}

impl From<&CourierConfig> for OrchestratorSettings {
    fn from(config: &CourierConfig) -> Self {
        Self {
            system_prompt: config.model.system_prompt.clone(),
            max_tool_rounds: config.orchestration.max_tool_rounds,
            rate_limit_retries: config.model.rate_limit_retries,
            rate_limit_backoff: BackoffPolicy::from(&config.reconnect),
        }
    }
}

/// Outcome of a handled message
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    pub user_id: String,
    /// The turn as recorded in the session
    pub turn: Turn,
    /// Tool rounds the turn went through
    pub rounds: usize,
}

impl TurnReport {
    /// Text to send back to the user
    pub fn reply(&self) -> &str {
        &self.turn.reply
    }

    pub fn is_failed(&self) -> bool {
        self.turn.is_failed()
    }
}

/// Runs turns for any number of users
pub struct Orchestrator {
    model: Arc<dyn LanguageModel>,
    dispatcher: Arc<ToolDispatcher>,
    sessions: Arc<dyn SessionStore>,
    settings: OrchestratorSettings,
    logger: Arc<dyn Logger>,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        dispatcher: Arc<ToolDispatcher>,
        sessions: Arc<dyn SessionStore>,
        settings: OrchestratorSettings,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            model,
            dispatcher,
            sessions,
            settings,
            logger,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Handle one inbound message.
    ///
    /// Turns for the same user run one at a time. Model failures and the
    /// round limit end the turn as `Failed` with a reply chosen by
    /// `failure_reply`, which is recorded
    /// like any other turn. If `cancel` fires the turn is dropped without
    /// touching the session; tool calls already sent keep running and their
    /// results are thrown away.
    pub async fn handle(&self, inbound: InboundMessage, cancel: CancellationToken) -> TurnResult<TurnReport> {
        let user_id = inbound.user_id.clone();
        let _guard = tokio::select! {
            guard = self.sessions.lock(&user_id) => guard?,
            _ = cancel.cancelled() => return Err(TurnError::Cancelled),
        };

        self.transition(&user_id, TurnState::AwaitingUserInput);
        let history = self.sessions.snapshot(&user_id).await?;
        let mut messages = prompt::build_messages(&history, &inbound);
        let mut turn = Turn::new(&inbound.text, inbound.attachment.clone());

        match self.run(&user_id, &mut turn, &mut messages, &cancel).await {
            Ok(reply) => {
                turn.reply = reply;
                turn.status = TurnStatus::Completed;
                self.transition(&user_id, TurnState::Done);
            }
            Err(e) if e.is_recorded() => {
                log_error!(self.logger, "[Orchestrator] Turn for {} failed: {}", user_id, e);
                turn.reply = failure_reply(&e).to_string();
                turn.status = TurnStatus::Failed {
                    reason: e.to_string(),
                };
                self.transition(&user_id, TurnState::Failed);
            }
            Err(e) => {
                log_warn!(self.logger, "[Orchestrator] Turn for {} abandoned: {}", user_id, e);
                return Err(e);
            }
        }

        if cancel.is_cancelled() {
            log_warn!(self.logger, "[Orchestrator] Turn for {} cancelled before recording", user_id);
            return Err(TurnError::Cancelled);
        }

        let rounds = turn.segments.len();
        self.sessions.append(&user_id, turn.clone()).await?;
        log_info!(
            self.logger,
            "[Orchestrator] Turn for {} finished after {} tool rounds ({} calls)",
            user_id,
            rounds,
            turn.tool_call_count()
        );

        Ok(TurnReport { user_id, turn, rounds })
    }

    async fn run(
        &self,
        user_id: &str,
        turn: &mut Turn,
        messages: &mut Vec<ChatMessage>,
        cancel: &CancellationToken,
    ) -> TurnResult<String> {
        let mut rounds = 0;
        loop {
            self.sync_tools().await;

            self.transition(user_id, TurnState::QueryingModel);
            let request = ModelRequest {
                system: self.settings.system_prompt.clone(),
                messages: messages.clone(),
                tools: self.dispatcher.registry().specs(),
            };
            let reply = self.query(request, cancel).await?;

            if !reply.has_tool_calls() {
                self.transition(user_id, TurnState::Responding);
                return Ok(reply.text);
            }

            if rounds >= self.settings.max_tool_rounds {
                return Err(TurnError::TurnLimitExceeded {
                    limit: self.settings.max_tool_rounds,
                });
            }
            rounds += 1;

            self.transition(user_id, TurnState::DispatchingTools(rounds));
            let ModelReply { text, tool_calls } = reply;
            let results = tokio::select! {
                results = self.dispatcher.execute_batch(&tool_calls) => results,
                _ = cancel.cancelled() => return Err(TurnError::Cancelled),
            };

            let segment = ToolSegment {
                assistant_text: text,
                calls: tool_calls,
                results,
            };
            messages.extend(prompt::segment_messages(&segment));
            turn.segments.push(segment);
        }
    }

    /// Ask the model, backing off on rate limits
    async fn query(&self, request: ModelRequest, cancel: &CancellationToken) -> TurnResult<ModelReply> {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(TurnError::Cancelled);
            }

            match self.model.complete(request.clone(), cancel.clone()).await {
                Ok(reply) => return Ok(reply),
                Err(ModelError::Cancelled) => return Err(TurnError::Cancelled),
                Err(e) if e.is_rate_limited() && attempt < self.settings.rate_limit_retries => {
                    let delay = self.settings.rate_limit_backoff.delay(attempt);
                    attempt += 1;
                    log_warn!(
                        self.logger,
                        "[Orchestrator] {} rate limited, retry {}/{} in {:?}",
                        self.model.name(),
                        attempt,
                        self.settings.rate_limit_retries,
                        delay
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(TurnError::Cancelled),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Pick up provider changes; a failed rebuild keeps the previous tools
    async fn sync_tools(&self) {
        let registry = self.dispatcher.registry();
        if let Err(e) = registry.sync(self.dispatcher.pool()).await {
            log_error!(self.logger, "[Orchestrator] Tool refresh failed, keeping previous tools: {}", e);
        }
    }

    fn transition(&self, user_id: &str, state: TurnState) {
        log_debug!(self.logger, "[Orchestrator] {} -> {}", user_id, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::config::{ProviderSettings, TransportSettings};
    use crate::llm::ScriptedModel;
    use crate::logging::NoOpLogger;
    use crate::pool::mock::{MockConnector, MockResponse, MockToolProvider};
    use crate::pool::{Connector, ProviderPool, ToolProvider};
    use crate::sessions::MemorySessionStore;
    use crate::tools::ToolRegistry;
    use crate::types::{ContentPart, MessageContent, ToolCallRequest, ToolErrorKind, ToolSpec};

    struct Fixture {
        tasks: Arc<MockToolProvider>,
        model: Arc<ScriptedModel>,
        sessions: Arc<MemorySessionStore>,
        orchestrator: Arc<Orchestrator>,
    }

    async fn fixture(model: ScriptedModel) -> Fixture {
        let logger: Arc<dyn Logger> = Arc::new(NoOpLogger::new());
        let tasks = Arc::new(MockToolProvider::new("tasks").with_spec(
            ToolSpec::new("tasks", "addItem", "Add a task").with_input_schema(json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            })),
        ));
        let connector = Arc::new(MockConnector::new());
        connector.register(Arc::clone(&tasks));

        let pool = Arc::new(ProviderPool::new(
            connector as Arc<dyn Connector>,
            BackoffPolicy::default(),
            Arc::clone(&logger),
        ));
        pool.connect(ProviderSettings::new("tasks", TransportSettings::InProcess))
            .await
            .unwrap();

        let registry = Arc::new(ToolRegistry::new(".", Arc::clone(&logger)));
        let dispatcher = Arc::new(ToolDispatcher::new(
            registry,
            pool,
            Duration::from_secs(30),
            Arc::clone(&logger),
        ));
        let sessions = Arc::new(MemorySessionStore::new(20, Arc::clone(&logger)));
        let model = Arc::new(model);

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&model) as Arc<dyn LanguageModel>,
            dispatcher,
            Arc::clone(&sessions) as Arc<dyn SessionStore>,
            OrchestratorSettings::default(),
            logger,
        ));

        Fixture {
            tasks,
            model,
            sessions,
            orchestrator,
        }
    }

    fn scripted() -> ScriptedModel {
        ScriptedModel::new(Arc::new(NoOpLogger::new()))
    }

    fn add_item(id: &str, text: &str) -> ToolCallRequest {
        ToolCallRequest::new(id, "tasks.addItem", json!({"text": text}))
    }

    #[tokio::test]
    async fn test_plain_reply_completes_turn() {
        let f = fixture(scripted().reply("Hello!")).await;

        let report = f
            .orchestrator
            .handle(InboundMessage::new("alice", "hi"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.reply(), "Hello!");
        assert_eq!(report.rounds, 0);
        assert!(!report.is_failed());

        // Tools were offered under their qualified names
        let request = &f.model.requests()[0];
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.tools[0].name, "tasks.addItem");

        assert_eq!(f.sessions.snapshot("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tool_round_feeds_results_back() {
        let f = fixture(
            scripted()
                .call_tools("", vec![add_item("c1", "buy milk")])
                .reply("Added 'buy milk' to your tasks."),
        )
        .await;

        let report = f
            .orchestrator
            .handle(InboundMessage::new("alice", "add buy milk to my tasks"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.rounds, 1);
        assert_eq!(f.tasks.invocations(), vec![("addItem".to_string(), json!({"text": "buy milk"}))]);

        let second = &f.model.requests()[1];
        let last = second.messages.last().unwrap();
        match &last.content {
            MessageContent::Parts(parts) => assert!(matches!(
                &parts[0],
                ContentPart::ToolResult { tool_use_id, is_error: false, .. } if tool_use_id == "c1"
            )),
            other => panic!("expected tool results, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tool_failures_do_not_abort_the_turn() {
        let f = fixture(
            scripted()
                .call_tools(
                    "",
                    vec![
                        ToolCallRequest::new("c1", "tasks.removeItem", json!({})),
                        ToolCallRequest::new("c2", "tasks.addItem", json!({"text": 3})),
                    ],
                )
                .reply("I couldn't do that."),
        )
        .await;

        let report = f
            .orchestrator
            .handle(InboundMessage::new("alice", "remove milk"), CancellationToken::new())
            .await
            .unwrap();

        assert!(!report.is_failed());
        let results = &report.turn.segments[0].results;
        assert_eq!(results[0].error_kind(), Some(ToolErrorKind::UnknownTool));
        assert_eq!(results[1].error_kind(), Some(ToolErrorKind::InvalidArguments));
        assert!(f.tasks.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_turn_limit_fails_after_ten_rounds() {
        let f = fixture(scripted().repeat(ModelReply::tool_calls("", vec![add_item("c", "again")]))).await;

        let report = f
            .orchestrator
            .handle(InboundMessage::new("alice", "loop forever"), CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_failed());
        assert_eq!(report.reply(), TURN_LIMIT_REPLY);
        assert_eq!(report.rounds, 10);
        assert_eq!(f.model.request_count(), 11);
        assert_eq!(f.tasks.invocation_count("addItem"), 10);

        let stored = f.sessions.snapshot("alice").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].is_failed());
    }

    #[test]
    fn test_failure_reply_depends_on_error_kind() {
        let model = |e: ModelError| failure_reply(&TurnError::Model(e));
        assert_eq!(
            model(ModelError::Auth {
                provider: "anthropic".into(),
                message: "401".into()
            }),
            AUTH_FAILURE_REPLY
        );
        assert_eq!(
            model(ModelError::RateLimited {
                provider: "anthropic".into(),
                message: "429".into()
            }),
            RATE_LIMIT_REPLY
        );
        assert_eq!(
            model(ModelError::Timeout {
                provider: "anthropic".into(),
                message: "timed out".into()
            }),
            TIMEOUT_REPLY
        );
        assert_eq!(model(ModelError::invalid_response("anthropic", "empty reply")), MODEL_FAILURE_REPLY);
        assert_eq!(
            failure_reply(&TurnError::TurnLimitExceeded { limit: 10 }),
            TURN_LIMIT_REPLY
        );
    }

    #[tokio::test]
    async fn test_model_error_is_recorded_with_apology() {
        let f = fixture(
            scripted()
                .fail(ModelError::Auth {
                    provider: "anthropic".into(),
                    message: "invalid x-api-key".into(),
                })
                .reply("Back again."),
        )
        .await;

        let report = f
            .orchestrator
            .handle(InboundMessage::new("alice", "hi"), CancellationToken::new())
            .await
            .unwrap();
        assert!(report.is_failed());
        assert_eq!(report.reply(), AUTH_FAILURE_REPLY);

        // The failed turn is part of the next prompt
        f.orchestrator
            .handle(InboundMessage::new("alice", "hello?"), CancellationToken::new())
            .await
            .unwrap();
        let next = &f.model.requests()[1];
        assert_eq!(next.messages.len(), 3);
        assert_eq!(next.messages[1].text(), Some(AUTH_FAILURE_REPLY));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limits_are_retried() {
        let limited = || ModelError::RateLimited {
            provider: "anthropic".into(),
            message: "429".into(),
        };
        let f = fixture(scripted().fail(limited()).fail(limited()).reply("Done.")).await;

        let report = f
            .orchestrator
            .handle(InboundMessage::new("alice", "hi"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.reply(), "Done.");
        assert_eq!(f.model.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion_fails_turn() {
        let mut model = scripted();
        for _ in 0..6 {
            model = model.fail(ModelError::RateLimited {
                provider: "anthropic".into(),
                message: "rate limit".into(),
            });
        }
        let f = fixture(model).await;

        let report = f
            .orchestrator
            .handle(InboundMessage::new("alice", "hi"), CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_failed());
        assert_eq!(report.reply(), RATE_LIMIT_REPLY);
        assert_eq!(f.model.request_count(), 6);
    }

    #[tokio::test]
    async fn test_collision_on_resync_keeps_previous_tools() {
        let f = fixture(
            scripted()
                .reply("Hello!")
                .call_tools("", vec![add_item("c1", "buy milk")])
                .reply("Added."),
        )
        .await;
        f.orchestrator
            .handle(InboundMessage::new("alice", "hi"), CancellationToken::new())
            .await
            .unwrap();

        // The provider comes back listing the same tool twice
        f.tasks.set_tools(vec![
            ToolSpec::new("tasks", "addItem", ""),
            ToolSpec::new("tasks", "addItem", ""),
        ]);
        let pool = f.orchestrator.dispatcher().pool();
        let handle = Arc::clone(&f.tasks) as Arc<dyn ToolProvider>;
        pool.mark_degraded("tasks", &handle);
        pool.ensure_ready("tasks").await.unwrap();
        let listed = f.tasks.listing_count();

        let report = f
            .orchestrator
            .handle(InboundMessage::new("alice", "add buy milk"), CancellationToken::new())
            .await
            .unwrap();

        assert!(!report.is_failed());
        assert_eq!(report.reply(), "Added.");
        assert_eq!(f.tasks.invocation_count("addItem"), 1);
        // One rebuild attempt for the new generation, none for the next query
        assert_eq!(f.tasks.listing_count(), listed + 1);

        let requests = f.model.requests();
        assert_eq!(requests.len(), 3);
        for request in &requests[1..] {
            assert_eq!(request.tools.len(), 1);
            assert_eq!(request.tools[0].name, "tasks.addItem");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_dispatch_discards_turn() {
        let f = fixture(
            scripted()
                .call_tools("", vec![add_item("c1", "buy milk")])
                .reply("unused"),
        )
        .await;
        f.tasks.push_response(
            "addItem",
            MockResponse::delayed(Duration::from_secs(5), MockResponse::Ok(json!("ok"))),
        );

        let cancel = CancellationToken::new();
        let orchestrator = Arc::clone(&f.orchestrator);
        let token = cancel.clone();
        let turn = tokio::spawn(async move {
            orchestrator
                .handle(InboundMessage::new("alice", "add buy milk"), token)
                .await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let result = turn.await.unwrap();
        assert!(matches!(result, Err(TurnError::Cancelled)));
        assert_eq!(f.tasks.invocation_count("addItem"), 1);
        assert!(f.sessions.snapshot("alice").await.unwrap().is_empty());
        assert_eq!(f.model.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_user_turns_are_serialized() {
        let f = fixture(
            scripted()
                .with_delay(Duration::from_secs(2))
                .reply("first")
                .reply("second"),
        )
        .await;

        let a = {
            let orchestrator = Arc::clone(&f.orchestrator);
            tokio::spawn(async move {
                orchestrator
                    .handle(InboundMessage::new("alice", "one"), CancellationToken::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let b = {
            let orchestrator = Arc::clone(&f.orchestrator);
            tokio::spawn(async move {
                orchestrator
                    .handle(InboundMessage::new("alice", "two"), CancellationToken::new())
                    .await
            })
        };

        assert_eq!(a.await.unwrap().unwrap().reply(), "first");
        assert_eq!(b.await.unwrap().unwrap().reply(), "second");

        // The second turn saw the first one in its prompt
        let second = &f.model.requests()[1];
        assert_eq!(second.messages.len(), 3);
        assert_eq!(f.sessions.snapshot("alice").await.unwrap().len(), 2);
    }
}
