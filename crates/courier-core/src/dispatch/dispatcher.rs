//! Executes model-requested tool calls
//!
//! Every request yields exactly one `ToolCallResult` carrying the request's
//! correlation id. Tool-level problems become failure outcomes; nothing here
//! returns a Rust error to the caller.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;

use crate::logging::Logger;
use crate::pool::ProviderPool;
use crate::tools::{schema, ToolRegistry};
use crate::types::{ToolCallRequest, ToolCallResult, ToolErrorKind, ToolSpec};
use crate::{log_debug, log_info, log_warn};

/// Resolves, validates, invokes and normalizes tool calls
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    pool: Arc<ProviderPool>,
    timeout: Duration,
    logger: Arc<dyn Logger>,
}

impl ToolDispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        pool: Arc<ProviderPool>,
        timeout: Duration,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            registry,
            pool,
            timeout,
            logger,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<ProviderPool> {
        &self.pool
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute one call.
    ///
    /// The timeout covers reconnect and retry. When it fires the provider call
    /// keeps running in the background and its result is dropped.
    pub async fn execute(&self, request: &ToolCallRequest) -> ToolCallResult {
        let spec = match self.registry.resolve(&request.name) {
            Ok(spec) => spec,
            Err(e) => {
                log_warn!(self.logger, "[Dispatcher] {}", e);
                return ToolCallResult::failure(
                    &request.id,
                    ToolErrorKind::UnknownTool,
                    format!("no tool named '{}' is available", request.name),
                );
            }
        };

        if let Err(violation) = schema::validate(&spec.input_schema, &request.arguments) {
            log_warn!(
                self.logger,
                "[Dispatcher] Rejected arguments for {}: {}",
                request.name,
                violation
            );
            return ToolCallResult::failure(
                &request.id,
                ToolErrorKind::InvalidArguments,
                violation.to_string(),
            );
        }

        log_info!(self.logger, "[Dispatcher] Calling {} ({})", request.name, request.id);
        let call = tokio::spawn(invoke_with_retry(
            Arc::clone(&self.pool),
            Arc::clone(&spec),
            request.arguments.clone(),
            Arc::clone(&self.logger),
        ));

        let payload = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => {
                log_warn!(
                    self.logger,
                    "[Dispatcher] {} ({}) timed out after {:?}",
                    request.name,
                    request.id,
                    self.timeout
                );
                return ToolCallResult::failure(
                    &request.id,
                    ToolErrorKind::Timeout,
                    format!("no answer within {}s", self.timeout.as_secs_f64()),
                );
            }
            Ok(Err(join_error)) => {
                return ToolCallResult::failure(
                    &request.id,
                    ToolErrorKind::ProviderError,
                    format!("tool call aborted: {}", join_error),
                );
            }
            Ok(Ok(Err(detail))) => {
                log_warn!(self.logger, "[Dispatcher] {} failed: {}", request.name, detail);
                return ToolCallResult::failure(&request.id, ToolErrorKind::ProviderError, detail);
            }
            Ok(Ok(Ok(payload))) => payload,
        };

        if let Some(output_schema) = &spec.output_schema {
            if let Err(violation) = schema::validate(output_schema, &payload) {
                log_warn!(
                    self.logger,
                    "[Dispatcher] {} returned a malformed result: {}",
                    request.name,
                    violation
                );
                return ToolCallResult::failure(
                    &request.id,
                    ToolErrorKind::MalformedResult,
                    format!("result does not match the declared output schema: {}", violation),
                );
            }
        }

        log_debug!(self.logger, "[Dispatcher] {} ({}) succeeded", request.name, request.id);
        ToolCallResult::success(&request.id, payload)
    }

    /// Execute a batch concurrently.
    ///
    /// Results come back in request order regardless of completion order.
    pub async fn execute_batch(&self, requests: &[ToolCallRequest]) -> Vec<ToolCallResult> {
        let mut pending: FuturesUnordered<_> = requests
            .iter()
            .enumerate()
            .map(|(index, request)| async move { (index, self.execute(request).await) })
            .collect();

        let mut slots: Vec<Option<ToolCallResult>> = vec![None; requests.len()];
        while let Some((index, result)) = pending.next().await {
            slots[index] = Some(result);
        }

        slots
            .into_iter()
            .zip(requests)
            .map(|(slot, request)| {
                slot.unwrap_or_else(|| {
                    ToolCallResult::failure(
                        &request.id,
                        ToolErrorKind::ProviderError,
                        "tool call produced no result",
                    )
                })
            })
            .collect()
    }
}

/// Invoke once; on a transport failure reconnect and try exactly once more
async fn invoke_with_retry(
    pool: Arc<ProviderPool>,
    spec: Arc<ToolSpec>,
    arguments: Value,
    logger: Arc<dyn Logger>,
) -> Result<Value, String> {
    let provider = spec.provider.as_str();
    let handle = pool
        .ensure_ready(provider)
        .await
        .map_err(|e| e.to_string())?;

    match handle.invoke(&spec.remote_name, arguments.clone()).await {
        Ok(payload) => Ok(payload),
        Err(e) if e.is_transient() => {
            log_warn!(
                logger,
                "[Dispatcher] {} dropped during {}: {}; retrying once",
                provider,
                spec.name,
                e
            );
            pool.mark_degraded(provider, &handle);
            let handle = pool
                .ensure_ready(provider)
                .await
                .map_err(|reconnect| format!("{} (after {})", reconnect, e))?;
            handle
                .invoke(&spec.remote_name, arguments)
                .await
                .map_err(|second| format!("failed twice: {}", second))
        }
        Err(e) => Err(e.to_string()),
    }
}
