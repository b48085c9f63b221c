use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use colony_types::{ErrorKind, OperationalError};

use crate::classifier::{classify_with_default, ErrorContext};
use crate::registry::ManifestRegistry;
use crate::retry::{is_retryable_tool, with_retry, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES};
use crate::sanitize::SchemaValidator;
use crate::telemetry::{TelemetrySink, ToolUsageRecord};

/// An executable tool, registered under its `namespace.function` name.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> anyhow::Result<Value>;
}

/// External file-cache collaborator, poked after mutating writes.
#[async_trait]
pub trait WriteCacheInvalidator: Send + Sync {
    async fn invalidate(&self, tool_name: &str);
}

const MUTATING_WRITE_PREFIX: &str = "file_system.write";

/// Central gate for every tool call: permission check, argument
/// sanitization, execution with optional retry, error classification, and
/// usage telemetry. The dispatcher never touches project state itself.
pub struct ToolDispatcher {
    registry: Arc<ManifestRegistry>,
    validator: SchemaValidator,
    tools: HashMap<String, Arc<dyn ToolHandler>>,
    telemetry: Option<Arc<TelemetrySink>>,
    write_cache: Option<Arc<dyn WriteCacheInvalidator>>,
    max_retries: u32,
    base_delay: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ManifestRegistry>) -> Self {
        Self {
            registry,
            validator: SchemaValidator::new(),
            tools: HashMap::new(),
            telemetry: None,
            write_cache: None,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    pub fn register_tool(mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        self.tools.insert(name.into(), handler);
        self
    }

    pub fn with_telemetry(mut self, sink: Arc<TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    pub fn with_write_cache(mut self, cache: Arc<dyn WriteCacheInvalidator>) -> Self {
        self.write_cache = Some(cache);
        self
    }

    pub fn with_retry_policy(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    /// Run one tool call on behalf of an agent. The result is the tool
    /// output serialized to JSON text; every failure path returns a
    /// classified `OperationalError`.
    pub async fn execute(
        &self,
        tool_name: &str,
        args: &Value,
        agent_id: &str,
    ) -> Result<String, OperationalError> {
        let started = Instant::now();
        let result = self.dispatch(tool_name, args, agent_id).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if let Some(telemetry) = &self.telemetry {
            telemetry
                .record_tool_usage(&ToolUsageRecord {
                    tool_name,
                    success: result.is_ok(),
                    agent_id,
                    execution_time_ms: elapsed_ms,
                    error: result.as_ref().err().map(|err| err.to_string()),
                })
                .await;
        }

        if result.is_ok() && tool_name.starts_with(MUTATING_WRITE_PREFIX) {
            if let Some(cache) = &self.write_cache {
                cache.invalidate(tool_name).await;
            }
        }

        result
    }

    async fn dispatch(
        &self,
        tool_name: &str,
        args: &Value,
        agent_id: &str,
    ) -> Result<String, OperationalError> {
        if !self.registry.is_permitted(agent_id, tool_name).await? {
            info!(agent = agent_id, tool = tool_name, "tool call denied");
            return Err(OperationalError::new(
                ErrorKind::PermissionDenied,
                format!("Agent '{agent_id}' not permitted for tool '{tool_name}'."),
            ));
        }

        let safe_args = self.validator.sanitize(tool_name, args)?;

        let handler = self.tools.get(tool_name).cloned().ok_or_else(|| {
            OperationalError::new(ErrorKind::ToolExecution, format!("Tool '{tool_name}' not found."))
        })?;

        debug!(agent = agent_id, tool = tool_name, "dispatching tool call");
        let ctx = ErrorContext {
            agent_id,
            tool_name,
        };

        // a failure raised by the handler is the tool's own failure, which
        // keeps allow-listed tools retryable regardless of message shape
        let classify_call =
            |err| classify_with_default(err, &ctx, ErrorKind::ToolExecution);

        let output = if is_retryable_tool(tool_name) {
            with_retry(
                || {
                    let handler = Arc::clone(&handler);
                    let args = safe_args.clone();
                    async move { handler.call(args).await.map_err(classify_call) }
                },
                self.max_retries,
                self.base_delay,
            )
            .await?
        } else {
            handler.call(safe_args).await.map_err(classify_call)?
        };

        serde_json::to_string(&output).map_err(|err| {
            OperationalError::new(
                ErrorKind::ToolExecution,
                format!("tool '{tool_name}' produced unserializable output: {err}"),
            )
        })
    }
}
