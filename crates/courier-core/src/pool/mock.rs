//! In-process tool providers for tests
//!
//! `MockToolProvider` replays queued responses per tool and records every
//! invocation. `MockConnector` hands out registered mocks and can be told to
//! fail handshakes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::error::{ConnectError, ConnectResult, InvokeError, InvokeResult};
use super::traits::{Connector, ToolProvider};
use crate::config::ProviderSettings;
use crate::types::ToolSpec;

/// Scripted answer to one invocation
#[derive(Debug, Clone)]
pub enum MockResponse {
    Ok(Value),
    /// Connection dropped mid-call
    Transient(String),
    /// Provider-reported error
    Remote(String),
    /// Sleep, then answer
    Delayed(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn delayed(delay: Duration, then: MockResponse) -> Self {
        MockResponse::Delayed(delay, Box::new(then))
    }
}

/// Tool provider with scripted behavior
pub struct MockToolProvider {
    id: String,
    tools: Mutex<Vec<ToolSpec>>,
    queued: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    fallback: Mutex<MockResponse>,
    invocations: Mutex<Vec<(String, Value)>>,
    healthy: AtomicBool,
    listing_fails: AtomicBool,
    listings: AtomicUsize,
}

impl MockToolProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tools: Mutex::new(Vec::new()),
            queued: Mutex::new(HashMap::new()),
            fallback: Mutex::new(MockResponse::Ok(json!({"ok": true}))),
            invocations: Mutex::new(Vec::new()),
            healthy: AtomicBool::new(true),
            listing_fails: AtomicBool::new(false),
            listings: AtomicUsize::new(0),
        }
    }

    /// Offer a tool with an open object schema
    pub fn with_tool(self, name: &str, description: &str) -> Self {
        let spec = ToolSpec::new(&self.id, name, description)
            .with_input_schema(json!({"type": "object"}));
        self.with_spec(spec)
    }

    /// Offer a fully specified tool
    pub fn with_spec(self, spec: ToolSpec) -> Self {
        self.tools.lock().push(spec);
        self
    }

    /// Answer used once a tool's queue is empty
    pub fn with_fallback(self, response: MockResponse) -> Self {
        *self.fallback.lock() = response;
        self
    }

    /// Queue the next answer for `tool`
    pub fn push_response(&self, tool: &str, response: MockResponse) {
        self.queued
            .lock()
            .entry(tool.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn set_tools(&self, tools: Vec<ToolSpec>) {
        *self.tools.lock() = tools;
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_listing_fails(&self, fails: bool) {
        self.listing_fails.store(fails, Ordering::SeqCst);
    }

    /// Every (tool, arguments) pair seen so far
    pub fn invocations(&self) -> Vec<(String, Value)> {
        self.invocations.lock().clone()
    }

    /// `list_tools` calls seen so far
    pub fn listing_count(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    pub fn invocation_count(&self, tool: &str) -> usize {
        self.invocations.lock().iter().filter(|(t, _)| t == tool).count()
    }

    fn next_response(&self, tool: &str) -> MockResponse {
        self.queued
            .lock()
            .get_mut(tool)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.fallback.lock().clone())
    }
}

async fn play(mut response: MockResponse) -> InvokeResult<Value> {
    loop {
        match response {
            MockResponse::Ok(value) => return Ok(value),
            MockResponse::Transient(message) => return Err(InvokeError::Transport(message)),
            MockResponse::Remote(message) => return Err(InvokeError::Remote(message)),
            MockResponse::Delayed(delay, then) => {
                tokio::time::sleep(delay).await;
                response = *then;
            }
        }
    }
}

#[async_trait]
impl ToolProvider for MockToolProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_tools(&self) -> InvokeResult<Vec<ToolSpec>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(InvokeError::Transport("listing failed".into()));
        }
        Ok(self.tools.lock().clone())
    }

    async fn invoke(&self, tool: &str, arguments: Value) -> InvokeResult<Value> {
        self.invocations.lock().push((tool.to_string(), arguments));
        let response = self.next_response(tool);
        play(response).await
    }

    async fn healthcheck(&self) -> InvokeResult<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(InvokeError::Transport("healthcheck failed".into()))
        }
    }
}

/// How many handshakes to refuse for a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    Times(u32),
    Always,
}

/// Connector handing out registered mock providers
#[derive(Default)]
pub struct MockConnector {
    providers: Mutex<HashMap<String, Arc<MockToolProvider>>>,
    failures: Mutex<HashMap<String, FailureMode>>,
    attempts: Mutex<HashMap<String, u32>>,
    connect_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: Arc<MockToolProvider>) {
        self.providers
            .lock()
            .insert(provider.id().to_string(), provider);
    }

    /// Refuse the next `times` handshakes for `id`
    pub fn fail_next(&self, id: &str, times: u32) {
        self.failures.lock().insert(id.to_string(), FailureMode::Times(times));
    }

    /// Refuse every handshake for `id`
    pub fn fail_always(&self, id: &str) {
        self.failures.lock().insert(id.to_string(), FailureMode::Always);
    }

    pub fn recover(&self, id: &str) {
        self.failures.lock().remove(id);
    }

    /// Time each handshake takes
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = Some(delay);
    }

    /// Handshakes attempted for `id`
    pub fn attempts(&self, id: &str) -> u32 {
        self.attempts.lock().get(id).copied().unwrap_or(0)
    }

    /// Largest number of handshakes observed running at once
    pub fn max_concurrent_connects(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn should_fail(&self, id: &str) -> bool {
        let mut failures = self.failures.lock();
        match failures.get(id).copied() {
            Some(FailureMode::Always) => true,
            Some(FailureMode::Times(n)) if n > 0 => {
                failures.insert(id.to_string(), FailureMode::Times(n - 1));
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, settings: &ProviderSettings) -> ConnectResult<Arc<dyn ToolProvider>> {
        *self.attempts.lock().entry(settings.id.clone()).or_insert(0) += 1;

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = *self.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.should_fail(&settings.id) {
            return Err(ConnectError::handshake(&settings.id, "connection refused"));
        }

        let provider = self.providers.lock().get(&settings.id).cloned();
        match provider {
            Some(provider) => Ok(provider as Arc<dyn ToolProvider>),
            None => Err(ConnectError::UnknownProvider(settings.id.clone())),
        }
    }
}
