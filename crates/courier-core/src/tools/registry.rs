//! Tool registry
//!
//! Maps qualified tool names to their specs. The whole index is rebuilt on
//! refresh and swapped in one step, so readers see either the old mapping or
//! the new one, never a mix.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use super::filter::ToolFilter;
use crate::logging::Logger;
use crate::pool::{ConnectionState, ProviderPool};
use crate::types::ToolSpec;
use crate::{log_debug, log_error, log_info, log_warn};

/// Registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown tool: {0}")]
    NotFound(String),

    /// Two tools share a qualified name, or the wire form of one; the
    /// previous index stays in place
    #[error("tool name collision on '{name}' between providers {first} and {second}")]
    NameCollision {
        name: String,
        first: String,
        second: String,
    },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Default)]
struct ToolIndex {
    by_name: HashMap<String, Arc<ToolSpec>>,
    /// Ordered by provider id, then as listed
    ordered: Vec<Arc<ToolSpec>>,
    /// Pool generation this index was built from
    generation: u64,
}

/// Namespaced view of every tool offered by the pool's providers
pub struct ToolRegistry {
    index: RwLock<Arc<ToolIndex>>,
    /// Pool generation whose rebuild hit a collision
    rejected: Mutex<Option<u64>>,
    refresh_lock: tokio::sync::Mutex<()>,
    separator: String,
    logger: Arc<dyn Logger>,
}

impl ToolRegistry {
    pub fn new(separator: impl Into<String>, logger: Arc<dyn Logger>) -> Self {
        Self {
            index: RwLock::new(Arc::new(ToolIndex::default())),
            rejected: Mutex::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
            separator: separator.into(),
            logger,
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Rebuild the mapping from every provider in the pool.
    ///
    /// Ready providers are asked for a live listing; a provider whose listing
    /// fails is marked degraded and contributes its cached tools, as do
    /// providers that are already degraded. Closed providers contribute
    /// nothing. Returns the number of registered tools.
    pub async fn refresh(&self, pool: &ProviderPool) -> RegistryResult<usize> {
        let _guard = self.refresh_lock.lock().await;
        self.rebuild(pool).await
    }

    /// Refresh only if the pool changed since the last rebuild.
    ///
    /// A generation that already failed with a collision is not retried; the
    /// previous index stays until the pool changes again.
    pub async fn sync(&self, pool: &ProviderPool) -> RegistryResult<bool> {
        if self.is_current(pool.generation()) {
            return Ok(false);
        }
        let _guard = self.refresh_lock.lock().await;
        if self.is_current(pool.generation()) {
            return Ok(false);
        }
        self.rebuild(pool).await?;
        Ok(true)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.index.read().generation == generation || *self.rejected.lock() == Some(generation)
    }

    async fn rebuild(&self, pool: &ProviderPool) -> RegistryResult<usize> {
        // Read before listing so changes made meanwhile trigger another sync
        let generation = pool.generation();
        let mut by_name: HashMap<String, Arc<ToolSpec>> = HashMap::new();
        let mut by_wire: HashMap<String, Arc<ToolSpec>> = HashMap::new();
        let mut ordered = Vec::new();

        for entry in pool.entries() {
            let id = entry.settings.id.as_str();
            let tools = match (entry.state, entry.handle) {
                (ConnectionState::Ready, Some(handle)) => match handle.list_tools().await {
                    Ok(tools) => {
                        pool.record_tools(id, tools.clone());
                        tools
                    }
                    Err(e) => {
                        log_warn!(
                            self.logger,
                            "[ToolRegistry] Listing tools from {} failed: {}",
                            id,
                            e
                        );
                        pool.mark_degraded(id, &handle);
                        entry.tools
                    }
                },
                (ConnectionState::Degraded, _) => entry.tools,
                (ConnectionState::Connecting, _) => entry.tools,
                _ => Vec::new(),
            };

            let filter = ToolFilter::from_settings(&entry.settings);
            for tool in tools.iter().filter(|t| filter.matches(t)) {
                let mut spec = tool.clone();
                spec.provider = id.to_string();
                let spec = Arc::new(spec.qualify(&self.separator));

                let wire = spec.wire_name();
                let clash = match by_name.get(&spec.name) {
                    Some(existing) => Some((spec.name.clone(), existing)),
                    None => by_wire.get(&wire).map(|existing| (wire.clone(), existing)),
                };
                if let Some((name, existing)) = clash {
                    let err = RegistryError::NameCollision {
                        name,
                        first: existing.provider.clone(),
                        second: spec.provider.clone(),
                    };
                    log_error!(self.logger, "[ToolRegistry] {}", err);
                    *self.rejected.lock() = Some(generation);
                    return Err(err);
                }
                by_name.insert(spec.name.clone(), Arc::clone(&spec));
                by_wire.insert(wire, Arc::clone(&spec));
                ordered.push(spec);
            }
        }

        let count = ordered.len();
        *self.rejected.lock() = None;
        *self.index.write() = Arc::new(ToolIndex {
            by_name,
            ordered,
            generation,
        });
        log_info!(self.logger, "[ToolRegistry] Registered {} tools", count);
        Ok(count)
    }

    /// Look up a qualified tool name
    pub fn resolve(&self, name: &str) -> RegistryResult<Arc<ToolSpec>> {
        let index = Arc::clone(&self.index.read());
        match index.by_name.get(name) {
            Some(spec) => Ok(Arc::clone(spec)),
            None => {
                log_debug!(self.logger, "[ToolRegistry] No tool named {}", name);
                Err(RegistryError::NotFound(name.to_string()))
            }
        }
    }

    /// Every registered tool, for the model request
    pub fn specs(&self) -> Vec<Arc<ToolSpec>> {
        self.index.read().ordered.clone()
    }

    pub fn len(&self) -> usize {
        self.index.read().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderSettings, TransportSettings};
    use crate::logging::NoOpLogger;
    use crate::pool::mock::{MockConnector, MockToolProvider};
    use crate::pool::{BackoffPolicy, Connector, ToolProvider};

    fn settings(id: &str) -> ProviderSettings {
        ProviderSettings::new(id, TransportSettings::InProcess)
    }

    fn pool_with(providers: Vec<Arc<MockToolProvider>>) -> (Arc<MockConnector>, ProviderPool) {
        let connector = Arc::new(MockConnector::new());
        for provider in providers {
            connector.register(provider);
        }
        let pool = ProviderPool::new(
            Arc::clone(&connector) as Arc<dyn Connector>,
            BackoffPolicy::default(),
            Arc::new(NoOpLogger::new()),
        );
        (connector, pool)
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new(".", Arc::new(NoOpLogger::new()))
    }

    #[tokio::test]
    async fn test_same_tool_name_on_two_providers() {
        let tasks = Arc::new(MockToolProvider::new("tasks").with_tool("search", "Search tasks"));
        let mail = Arc::new(MockToolProvider::new("mail").with_tool("search", "Search mail"));
        let (_, pool) = pool_with(vec![tasks, mail]);
        pool.connect(settings("tasks")).await.unwrap();
        pool.connect(settings("mail")).await.unwrap();

        let registry = registry();
        assert_eq!(registry.refresh(&pool).await.unwrap(), 2);

        let spec = registry.resolve("tasks.search").unwrap();
        assert_eq!(spec.provider, "tasks");
        assert_eq!(spec.remote_name, "search");
        assert_eq!(registry.resolve("mail.search").unwrap().provider, "mail");
        assert!(matches!(registry.resolve("search"), Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_collision_after_namespacing_is_reported() {
        // "a_b" + "c" and "a" + "b_c" both qualify to "a_b_c"
        let first = Arc::new(MockToolProvider::new("a_b").with_tool("c", ""));
        let second = Arc::new(MockToolProvider::new("a").with_tool("b_c", ""));
        let (_, pool) = pool_with(vec![first, second]);
        pool.connect(settings("a_b")).await.unwrap();

        let registry = ToolRegistry::new("_", Arc::new(NoOpLogger::new()));
        registry.refresh(&pool).await.unwrap();
        assert!(registry.resolve("a_b_c").is_ok());

        pool.connect(settings("a")).await.unwrap();
        let err = registry.refresh(&pool).await.unwrap_err();
        assert_eq!(
            err,
            RegistryError::NameCollision {
                name: "a_b_c".into(),
                first: "a".into(),
                second: "a_b".into()
            }
        );
        // Previous mapping survives a failed refresh
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("a_b_c").unwrap().provider, "a_b");
    }

    #[tokio::test]
    async fn test_names_equal_on_the_wire_collide() {
        let todo = Arc::new(MockToolProvider::new("todo").with_tool("list_get", ""));
        let todo_list = Arc::new(MockToolProvider::new("todo_list").with_tool("get", ""));
        let (_, pool) = pool_with(vec![todo, todo_list]);
        pool.connect(settings("todo")).await.unwrap();
        pool.connect(settings("todo_list")).await.unwrap();

        let err = registry().refresh(&pool).await.unwrap_err();
        assert_eq!(
            err,
            RegistryError::NameCollision {
                name: "todo_list_get".into(),
                first: "todo".into(),
                second: "todo_list".into()
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_generation_is_not_rebuilt_again() {
        let tasks = Arc::new(MockToolProvider::new("tasks").with_tool("addItem", ""));
        let (_, pool) = pool_with(vec![Arc::clone(&tasks)]);
        pool.connect(settings("tasks")).await.unwrap();

        let registry = registry();
        assert!(registry.sync(&pool).await.unwrap());

        // Reconnecting with a duplicate listing bumps the generation
        tasks.set_tools(vec![
            ToolSpec::new("tasks", "addItem", ""),
            ToolSpec::new("tasks", "addItem", ""),
        ]);
        let handle = Arc::clone(&tasks) as Arc<dyn ToolProvider>;
        pool.mark_degraded("tasks", &handle);
        pool.ensure_ready("tasks").await.unwrap();

        let listed = tasks.listing_count();
        assert!(matches!(
            registry.sync(&pool).await,
            Err(RegistryError::NameCollision { .. })
        ));
        assert_eq!(tasks.listing_count(), listed + 1);

        assert!(!registry.sync(&pool).await.unwrap());
        assert!(!registry.sync(&pool).await.unwrap());
        assert_eq!(tasks.listing_count(), listed + 1);
        assert_eq!(registry.resolve("tasks.addItem").unwrap().provider, "tasks");

        // A fixed listing is picked up once the pool changes again
        tasks.set_tools(vec![ToolSpec::new("tasks", "addItem", "")]);
        pool.mark_degraded("tasks", &handle);
        pool.ensure_ready("tasks").await.unwrap();
        assert!(registry.sync(&pool).await.unwrap());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_filters_apply() {
        let tasks = Arc::new(
            MockToolProvider::new("tasks")
                .with_tool("addItem", "")
                .with_tool("purgeAll", ""),
        );
        let (_, pool) = pool_with(vec![tasks]);
        pool.connect(settings("tasks").with_exclude(["purgeAll"])).await.unwrap();

        let registry = registry();
        registry.refresh(&pool).await.unwrap();
        assert!(registry.resolve("tasks.addItem").is_ok());
        assert!(registry.resolve("tasks.purgeAll").is_err());
    }

    #[tokio::test]
    async fn test_failed_listing_degrades_and_keeps_cached_tools() {
        let tasks = Arc::new(MockToolProvider::new("tasks").with_tool("addItem", ""));
        let (_, pool) = pool_with(vec![Arc::clone(&tasks)]);
        pool.connect(settings("tasks")).await.unwrap();

        tasks.set_listing_fails(true);
        let registry = registry();
        assert_eq!(registry.refresh(&pool).await.unwrap(), 1);
        assert_eq!(
            pool.connection("tasks").unwrap().state,
            ConnectionState::Degraded
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_drops_tools_of_retired_provider() {
        let tasks = Arc::new(MockToolProvider::new("tasks").with_tool("addItem", ""));
        let (connector, pool) = pool_with(vec![Arc::clone(&tasks)]);
        pool.connect(settings("tasks")).await.unwrap();

        let registry = registry();
        assert!(registry.sync(&pool).await.unwrap());
        assert!(!registry.sync(&pool).await.unwrap());
        assert!(registry.resolve("tasks.addItem").is_ok());

        let handle: Arc<dyn ToolProvider> = tasks;
        pool.mark_degraded("tasks", &handle);
        connector.fail_always("tasks");
        assert!(pool.ensure_ready("tasks").await.is_err());

        assert!(registry.sync(&pool).await.unwrap());
        assert!(matches!(
            registry.resolve("tasks.addItem"),
            Err(RegistryError::NotFound(_))
        ));
        assert!(registry.is_empty());
    }
}
