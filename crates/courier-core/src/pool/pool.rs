//! Provider connection pool
//!
//! One shared connection per provider. Reconnects are serialized per provider
//! by a slot-local async mutex; callers arriving while a reconnect is running
//! wait for it and reuse its result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::backoff::BackoffPolicy;
use super::connection::{ConnectionState, ProviderConnection};
use super::error::{ConnectError, ConnectResult};
use super::traits::{Connector, ToolProvider};
use crate::config::ProviderSettings;
use crate::logging::Logger;
use crate::types::ToolSpec;
use crate::{log_debug, log_info, log_warn};

struct SlotState {
    state: ConnectionState,
    handle: Option<Arc<dyn ToolProvider>>,
    tools: Vec<ToolSpec>,
    retired: bool,
}

struct Slot {
    settings: ProviderSettings,
    inner: RwLock<SlotState>,
    reconnect: tokio::sync::Mutex<()>,
}

impl Slot {
    fn new(settings: ProviderSettings) -> Self {
        Self {
            settings,
            inner: RwLock::new(SlotState {
                state: ConnectionState::Connecting,
                handle: None,
                tools: Vec::new(),
                retired: false,
            }),
            reconnect: tokio::sync::Mutex::new(()),
        }
    }

    fn ready_handle(&self) -> Option<Arc<dyn ToolProvider>> {
        let inner = self.inner.read();
        match inner.state {
            ConnectionState::Ready => inner.handle.clone(),
            _ => None,
        }
    }

    fn is_retired(&self) -> bool {
        self.inner.read().retired
    }

    fn snapshot(&self) -> ProviderConnection {
        let inner = self.inner.read();
        ProviderConnection {
            id: self.settings.id.clone(),
            state: inner.state,
            retired: inner.retired,
            tools: inner.tools.clone(),
        }
    }
}

/// Provider view handed to the tool registry
pub(crate) struct PoolEntry {
    pub settings: ProviderSettings,
    pub state: ConnectionState,
    pub handle: Option<Arc<dyn ToolProvider>>,
    pub tools: Vec<ToolSpec>,
}

fn same_handle(a: &Arc<dyn ToolProvider>, b: &Arc<dyn ToolProvider>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Owns every provider connection
pub struct ProviderPool {
    connector: Arc<dyn Connector>,
    policy: BackoffPolicy,
    slots: RwLock<HashMap<String, Arc<Slot>>>,
    generation: AtomicU64,
    logger: Arc<dyn Logger>,
}

impl ProviderPool {
    pub fn new(connector: Arc<dyn Connector>, policy: BackoffPolicy, logger: Arc<dyn Logger>) -> Self {
        Self {
            connector,
            policy,
            slots: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            logger,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Incremented whenever a provider's advertised tool set may have changed
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn slot(&self, id: &str) -> ConnectResult<Arc<Slot>> {
        self.slots
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ConnectError::UnknownProvider(id.to_string()))
    }

    /// Register a provider and perform its first handshake.
    ///
    /// On failure the provider stays registered as `Closed`, so a later
    /// `ensure_ready` can still bring it up.
    pub async fn connect(&self, settings: ProviderSettings) -> ConnectResult<ProviderConnection> {
        let id = settings.id.clone();
        let slot = Arc::new(Slot::new(settings));
        self.slots.write().insert(id.clone(), Arc::clone(&slot));

        let _guard = slot.reconnect.lock().await;
        log_info!(self.logger, "[ProviderPool] Connecting to {}", id);

        match self.handshake(&slot).await {
            Ok(_) => Ok(slot.snapshot()),
            Err(e) => {
                log_warn!(self.logger, "[ProviderPool] Initial connect to {} failed: {}", id, e);
                slot.inner.write().state = ConnectionState::Closed;
                Err(e)
            }
        }
    }

    /// One handshake plus tool listing; on success the slot becomes `Ready`
    async fn handshake(&self, slot: &Slot) -> ConnectResult<Arc<dyn ToolProvider>> {
        let id = &slot.settings.id;
        let handle = self.connector.connect(&slot.settings).await?;
        let tools = handle
            .list_tools()
            .await
            .map_err(|e| ConnectError::handshake(id, format!("listing tools: {}", e)))?;

        log_info!(
            self.logger,
            "[ProviderPool] {} ready with {} tools",
            id,
            tools.len()
        );
        {
            let mut inner = slot.inner.write();
            inner.state = ConnectionState::Ready;
            inner.handle = Some(Arc::clone(&handle));
            inner.tools = tools;
        }
        self.bump();
        Ok(handle)
    }

    /// Return a ready connection, reconnecting with backoff if needed.
    ///
    /// After `max_attempts` consecutive failures the provider is closed for
    /// the rest of the process lifetime and its tools are withdrawn.
    pub async fn ensure_ready(&self, id: &str) -> ConnectResult<Arc<dyn ToolProvider>> {
        let slot = self.slot(id)?;
        if let Some(handle) = slot.ready_handle() {
            return Ok(handle);
        }
        if slot.is_retired() {
            return Err(self.retired(id));
        }

        let _guard = slot.reconnect.lock().await;
        // Another caller may have finished a reconnect while we waited
        if let Some(handle) = slot.ready_handle() {
            return Ok(handle);
        }
        if slot.is_retired() {
            return Err(self.retired(id));
        }

        slot.inner.write().state = ConnectionState::Connecting;
        for attempt in 0..self.policy.max_attempts {
            if attempt > 0 {
                let delay = self.policy.delay(attempt - 1);
                log_debug!(
                    self.logger,
                    "[ProviderPool] Waiting {:?} before reconnect attempt {} to {}",
                    delay,
                    attempt + 1,
                    id
                );
                tokio::time::sleep(delay).await;
            }
            match self.handshake(&slot).await {
                Ok(handle) => {
                    log_info!(
                        self.logger,
                        "[ProviderPool] Reconnected to {} on attempt {}",
                        id,
                        attempt + 1
                    );
                    return Ok(handle);
                }
                Err(e) => {
                    log_warn!(
                        self.logger,
                        "[ProviderPool] Reconnect attempt {}/{} to {} failed: {}",
                        attempt + 1,
                        self.policy.max_attempts,
                        id,
                        e
                    );
                }
            }
        }

        {
            let mut inner = slot.inner.write();
            inner.state = ConnectionState::Closed;
            inner.retired = true;
            inner.handle = None;
            inner.tools.clear();
        }
        self.bump();
        log_warn!(
            self.logger,
            "[ProviderPool] {} permanently closed; restart required",
            id
        );
        Err(self.retired(id))
    }

    fn retired(&self, id: &str) -> ConnectError {
        ConnectError::Retired {
            provider: id.to_string(),
            attempts: self.policy.max_attempts,
        }
    }

    /// Flag a connection whose call failed at the transport level.
    ///
    /// Ignored when `handle` is no longer the current connection, which means
    /// someone already replaced it.
    pub fn mark_degraded(&self, id: &str, handle: &Arc<dyn ToolProvider>) {
        let Ok(slot) = self.slot(id) else {
            return;
        };
        let mut inner = slot.inner.write();
        let current = matches!(&inner.handle, Some(h) if same_handle(h, handle));
        if current && inner.state == ConnectionState::Ready {
            inner.state = ConnectionState::Degraded;
            log_warn!(self.logger, "[ProviderPool] {} degraded", id);
        }
    }

    /// Replace the cached tool list after a live listing
    pub(crate) fn record_tools(&self, id: &str, tools: Vec<ToolSpec>) {
        if let Ok(slot) = self.slot(id) {
            slot.inner.write().tools = tools;
        }
    }

    pub(crate) fn entries(&self) -> Vec<PoolEntry> {
        let slots: Vec<Arc<Slot>> = self.slots.read().values().cloned().collect();
        let mut entries: Vec<PoolEntry> = slots
            .iter()
            .map(|slot| {
                let inner = slot.inner.read();
                PoolEntry {
                    settings: slot.settings.clone(),
                    state: inner.state,
                    handle: inner.handle.clone(),
                    tools: inner.tools.clone(),
                }
            })
            .collect();
        entries.sort_by(|a, b| a.settings.id.cmp(&b.settings.id));
        entries
    }

    /// State of one provider
    pub fn connection(&self, id: &str) -> Option<ProviderConnection> {
        self.slot(id).ok().map(|slot| slot.snapshot())
    }

    /// State of every provider, ordered by id
    pub fn connections(&self) -> Vec<ProviderConnection> {
        let slots: Vec<Arc<Slot>> = self.slots.read().values().cloned().collect();
        let mut connections: Vec<ProviderConnection> = slots.iter().map(|s| s.snapshot()).collect();
        connections.sort_by(|a, b| a.id.cmp(&b.id));
        connections
    }

    /// Probe ready providers and bring back degraded or closed ones.
    ///
    /// Retired providers are left alone.
    pub async fn heal(&self) {
        let slots: Vec<Arc<Slot>> = self.slots.read().values().cloned().collect();
        for slot in slots {
            let id = slot.settings.id.clone();
            if slot.is_retired() {
                continue;
            }
            if let Some(handle) = slot.ready_handle() {
                if let Err(e) = handle.healthcheck().await {
                    log_warn!(self.logger, "[ProviderPool] Healthcheck for {} failed: {}", id, e);
                    self.mark_degraded(&id, &handle);
                } else {
                    continue;
                }
            }
            if let Err(e) = self.ensure_ready(&id).await {
                log_warn!(self.logger, "[ProviderPool] Could not restore {}: {}", id, e);
            }
        }
    }
}
