//! Tool registry for conversation mode.
//!
//! Tools are registered handlers keyed by name. The registry is the error
//! boundary: whatever a tool does (fail, panic, hang), the caller gets a
//! [`ToolOutcome`], never an error.

use crate::error::ToolError;
use crate::message::{ToolCall, ToolOutcome};
use async_trait::async_trait;
use futures::StreamExt;
use parlance_ai::ToolSpec;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default per-call timeout.
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Definition of a tool available during conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema for input parameters.
    pub input_schema: JsonValue,
}

impl ToolDefinition {
    /// Creates a new tool definition with an empty object schema.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: JsonValue) -> Self {
        self.input_schema = schema;
        self
    }

    /// Converts the definition to the provider's tool declaration.
    #[must_use]
    pub fn to_spec(&self) -> ToolSpec {
        ToolSpec::function(&self.name, &self.description, self.input_schema.clone())
    }
}

/// Uniform capability contract for a tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Executes the tool with the given arguments.
    async fn execute(&self, arguments: Map<String, JsonValue>) -> Result<JsonValue, ToolError>;
}

/// A tool call whose arguments have been parsed but which has not run yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolCall {
    /// Call identifier.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Parsed arguments.
    pub arguments: Map<String, JsonValue>,
}

/// Registry of available tools.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
    timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ToolRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Registers a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.definition().name;
        if self.tools.insert(name.clone(), Arc::new(tool)).is_none() {
            self.order.push(name);
        }
    }

    /// Returns true if a tool with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Returns all tool definitions in registration order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Returns the catalog in the provider's declaration format.
    #[must_use]
    pub fn to_specs(&self) -> Vec<ToolSpec> {
        self.definitions().iter().map(ToolDefinition::to_spec).collect()
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Executes one tool. Never fails: every fault becomes `{error: ...}`.
    #[instrument(skip(self, arguments), fields(tool = %name))]
    pub async fn execute(&self, name: &str, arguments: Map<String, JsonValue>) -> ToolOutcome {
        let Some(tool) = self.tools.get(name).cloned() else {
            warn!("unknown tool requested");
            return ToolOutcome::failure(
                ToolError::NotFound {
                    name: name.to_string(),
                }
                .to_string(),
            );
        };

        let handle = tokio::spawn(async move { tool.execute(arguments).await });
        let abort = handle.abort_handle();

        let error = match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(Ok(payload))) => {
                debug!("tool finished");
                return ToolOutcome::from_payload(payload);
            }
            Ok(Ok(Err(e))) => e,
            Ok(Err(_join)) => ToolError::Panicked {
                name: name.to_string(),
            },
            Err(_elapsed) => {
                abort.abort();
                ToolError::Timeout {
                    name: name.to_string(),
                    after_secs: self.timeout.as_secs(),
                }
            }
        };

        warn!(error = %error, "tool failed");
        ToolOutcome::failure(error.to_string())
    }

    /// Executes calls concurrently, at most `max_concurrent` at a time, and
    /// returns the records in the original call order.
    pub async fn execute_all(
        &self,
        calls: Vec<PendingToolCall>,
        max_concurrent: usize,
    ) -> Vec<ToolCall> {
        futures::stream::iter(calls)
            .map(|call| async move {
                let result = self.execute(&call.name, call.arguments.clone()).await;
                ToolCall::new(call.id, call.name, call.arguments, result)
            })
            .buffered(max_concurrent.max(1))
            .collect()
            .await
    }
}

/// Returns a non-blank string argument.
pub(crate) fn str_arg<'a>(arguments: &'a Map<String, JsonValue>, key: &str) -> Option<&'a str> {
    arguments
        .get(key)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Returns a non-negative integer argument. Accepts whole floats and numeric strings.
pub(crate) fn u64_arg(arguments: &Map<String, JsonValue>, key: &str) -> Option<u64> {
    match arguments.get(key)? {
        JsonValue::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
