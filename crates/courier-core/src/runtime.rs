//! Wiring of the core components
//!
//! `Courier` owns the pool, registry, dispatcher, session store and turn loop
//! built from one `CourierConfig`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::agent::{Orchestrator, OrchestratorSettings, TurnReport, TurnResult};
use crate::config::{ConfigError, CourierConfig};
use crate::dispatch::ToolDispatcher;
use crate::llm::LanguageModel;
use crate::logging::Logger;
use crate::pool::{BackoffPolicy, Connector, ProviderConnection, ProviderPool};
use crate::sessions::{MemorySessionStore, SessionResult, SessionStore, SessionSummary};
use crate::tools::{RegistryError, ToolRegistry};
use crate::types::{CancellationToken, InboundMessage};
use crate::{log_error, log_info, log_warn};

/// Reasons the runtime refuses to start
#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Two providers ended up with the same qualified tool name
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Health snapshot for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub tool_count: usize,
    pub providers: Vec<ProviderHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub id: String,
    pub state: String,
    pub retired: bool,
    pub tool_count: usize,
}

impl From<ProviderConnection> for ProviderHealth {
    fn from(connection: ProviderConnection) -> Self {
        Self {
            id: connection.id,
            state: connection.state.to_string(),
            retired: connection.retired,
            tool_count: connection.tools.len(),
        }
    }
}

/// The assembled core
pub struct Courier {
    config: CourierConfig,
    pool: Arc<ProviderPool>,
    registry: Arc<ToolRegistry>,
    sessions: Arc<dyn SessionStore>,
    orchestrator: Arc<Orchestrator>,
    logger: Arc<dyn Logger>,
}

impl Courier {
    /// Validate the config, connect every enabled provider and build the
    /// initial tool index.
    ///
    /// A provider that fails its first handshake does not stop startup; it
    /// stays closed until a call or maintenance pass reconnects it. A name
    /// collision does.
    pub async fn start(
        config: CourierConfig,
        connector: Arc<dyn Connector>,
        model: Arc<dyn LanguageModel>,
        logger: Arc<dyn Logger>,
    ) -> Result<Self, StartupError> {
        config.validate()?;

        let pool = Arc::new(ProviderPool::new(
            connector,
            BackoffPolicy::from(&config.reconnect),
            Arc::clone(&logger),
        ));
        for settings in config.enabled_providers() {
            if let Err(e) = pool.connect(settings.clone()).await {
                log_warn!(logger, "[Courier] Starting without {}: {}", settings.id, e);
            }
        }

        let registry = Arc::new(ToolRegistry::new(
            config.registry.separator.clone(),
            Arc::clone(&logger),
        ));
        registry.refresh(&pool).await?;

        let dispatcher = Arc::new(ToolDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&pool),
            config.dispatch.timeout(),
            Arc::clone(&logger),
        ));
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(
            config.sessions.max_turns,
            Arc::clone(&logger),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            model,
            dispatcher,
            Arc::clone(&sessions),
            OrchestratorSettings::from(&config),
            Arc::clone(&logger),
        ));

        log_info!(
            logger,
            "[Courier] Started with {} providers and {} tools",
            pool.connections().len(),
            registry.len()
        );

        Ok(Self {
            config,
            pool,
            registry,
            sessions,
            orchestrator,
            logger,
        })
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ProviderPool> {
        &self.pool
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Run one turn for an inbound message
    pub async fn handle(&self, inbound: InboundMessage, cancel: CancellationToken) -> TurnResult<TurnReport> {
        self.orchestrator.handle(inbound, cancel).await
    }

    pub async fn conversations(&self) -> SessionResult<Vec<SessionSummary>> {
        self.sessions.list().await
    }

    pub fn health(&self) -> HealthReport {
        let providers: Vec<ProviderHealth> = self
            .pool
            .connections()
            .into_iter()
            .map(ProviderHealth::from)
            .collect();
        let all_retired = !providers.is_empty() && providers.iter().all(|p| p.retired);
        HealthReport {
            status: if all_retired { "degraded" } else { "healthy" },
            tool_count: self.registry.len(),
            providers,
        }
    }

    /// Evict idle sessions, heal providers, and pick up tool changes.
    ///
    /// Returns the number of sessions evicted.
    pub async fn maintain(&self) -> usize {
        let evicted = match self.sessions.evict_idle(self.config.sessions.idle_timeout()).await {
            Ok(n) => n,
            Err(e) => {
                log_error!(self.logger, "[Courier] Session eviction failed: {}", e);
                0
            }
        };

        self.pool.heal().await;
        if let Err(e) = self.registry.sync(&self.pool).await {
            log_error!(self.logger, "[Courier] Tool refresh failed: {}", e);
        }
        evicted
    }

    /// Run `maintain` every `interval` until the handle is aborted
    pub fn spawn_maintenance(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let courier = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                courier.maintain().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderSettings, SessionSettings, TransportSettings};
    use crate::llm::ScriptedModel;
    use crate::logging::NoOpLogger;
    use crate::pool::mock::{MockConnector, MockToolProvider};
    use crate::pool::ConnectionState;

    fn logger() -> Arc<dyn Logger> {
        Arc::new(NoOpLogger::new())
    }

    fn config(ids: &[&str]) -> CourierConfig {
        CourierConfig {
            providers: ids
                .iter()
                .map(|id| ProviderSettings::new(*id, TransportSettings::InProcess))
                .collect(),
            ..Default::default()
        }
    }

    fn model() -> Arc<dyn LanguageModel> {
        Arc::new(ScriptedModel::new(logger()).reply("hello"))
    }

    #[tokio::test]
    async fn test_start_connects_and_indexes() {
        let connector = Arc::new(MockConnector::new());
        connector.register(Arc::new(MockToolProvider::new("tasks").with_tool("addItem", "")));
        connector.register(Arc::new(MockToolProvider::new("mail").with_tool("send", "")));

        let courier = Courier::start(config(&["tasks", "mail"]), connector, model(), logger())
            .await
            .unwrap();

        assert_eq!(courier.registry().len(), 2);
        let health = courier.health();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.providers.len(), 2);
        assert!(health.providers.iter().all(|p| p.state == "ready"));
    }

    #[tokio::test]
    async fn test_unreachable_provider_does_not_block_startup() {
        let connector = Arc::new(MockConnector::new());
        connector.register(Arc::new(MockToolProvider::new("tasks").with_tool("addItem", "")));
        connector.register(Arc::new(MockToolProvider::new("mail").with_tool("send", "")));
        connector.fail_always("mail");

        let courier = Courier::start(config(&["tasks", "mail"]), connector, model(), logger())
            .await
            .unwrap();

        assert_eq!(courier.registry().len(), 1);
        assert_eq!(
            courier.pool().connection("mail").unwrap().state,
            ConnectionState::Closed
        );
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let connector = Arc::new(MockConnector::new());
        let result = Courier::start(config(&["tasks", "Tasks"]), connector, model(), logger()).await;
        assert!(matches!(result, Err(StartupError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintain_evicts_idle_sessions() {
        let connector = Arc::new(MockConnector::new());
        let mut config = config(&[]);
        config.sessions = SessionSettings {
            max_turns: 20,
            idle_timeout_secs: 60,
        };
        let courier = Courier::start(config, connector, model(), logger()).await.unwrap();

        courier
            .handle(InboundMessage::new("alice", "hi"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(courier.conversations().await.unwrap().len(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(courier.maintain().await, 1);
        assert!(courier.conversations().await.unwrap().is_empty());
    }
}
