//! Test doubles shared by the unit tests of this crate.

use crate::error::ToolError;
use crate::tool::{Tool, ToolDefinition};
use async_trait::async_trait;
use parlance_ai::{
    CompletionClient, CompletionError, CompletionMessage, CompletionRequest, Delta, DeltaStream,
    ToolCallRequest,
};
use rootcause::Report;
use serde_json::{Map, Value as JsonValue, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};

/// One scripted provider response.
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    /// Blocking completion result.
    Reply(Option<CompletionMessage>),
    /// Items of a delta stream, delivered in order, then end-of-stream.
    Stream(Vec<Result<Delta, CompletionError>>),
    /// The call itself fails.
    Fail(CompletionError),
}

impl Scripted {
    pub(crate) fn text(content: &str) -> Self {
        Self::Reply(Some(CompletionMessage {
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
        }))
    }

    pub(crate) fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self::Reply(Some(CompletionMessage {
            content: None,
            tool_calls: calls,
        }))
    }

    pub(crate) fn deltas(deltas: Vec<Delta>) -> Self {
        Self::Stream(deltas.into_iter().map(Ok).collect())
    }

    pub(crate) fn unavailable() -> Self {
        Self::Fail(CompletionError::ProviderUnavailable {
            provider: "scripted".to_string(),
            reason: "connection refused".to_string(),
        })
    }
}

/// A completion client that replays a script and records every request.
#[derive(Debug, Default)]
pub(crate) struct ScriptedClient {
    steps: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<CompletionRequest>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedClient {
    pub(crate) fn new(steps: Vec<Scripted>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    /// Every call waits for one permit on the returned semaphore.
    pub(crate) fn gated(steps: Vec<Scripted>) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let client = Self {
            gate: Some(gate.clone()),
            ..Self::new(steps)
        };
        (client, gate)
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    async fn next(&self, request: &CompletionRequest) -> Scripted {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate open").forget();
        }
        self.steps
            .lock()
            .expect("steps lock")
            .pop_front()
            .unwrap_or_else(|| {
                Scripted::Fail(CompletionError::RequestFailed {
                    reason: "script exhausted".to_string(),
                })
            })
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Option<CompletionMessage>, Report<CompletionError>> {
        match self.next(request).await {
            Scripted::Reply(message) => Ok(message),
            Scripted::Fail(e) => Err(e.into()),
            Scripted::Stream(_) => Err(CompletionError::RequestFailed {
                reason: "scripted a stream for a blocking call".to_string(),
            }
            .into()),
        }
    }

    async fn stream_complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<DeltaStream, Report<CompletionError>> {
        match self.next(request).await {
            Scripted::Stream(items) => {
                let (tx, rx) = mpsc::channel(items.len().max(1));
                for item in items {
                    tx.try_send(item).expect("channel sized to script");
                }
                Ok(rx)
            }
            Scripted::Fail(e) => Err(e.into()),
            Scripted::Reply(_) => Err(CompletionError::RequestFailed {
                reason: "scripted a reply for a streaming call".to_string(),
            }
            .into()),
        }
    }
}

/// A tool whose execution always fails.
pub(crate) struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("explode", "Always fails")
    }

    async fn execute(&self, _arguments: Map<String, JsonValue>) -> Result<JsonValue, ToolError> {
        Err(ToolError::ExecutionFailed {
            name: "explode".to_string(),
            reason: "downstream service returned 500".to_string(),
        })
    }
}

/// A tool that panics.
pub(crate) struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("panic", "Panics")
    }

    async fn execute(&self, _arguments: Map<String, JsonValue>) -> Result<JsonValue, ToolError> {
        panic!("tool bug");
    }
}

/// A tool that sleeps before answering.
pub(crate) struct SleepyTool {
    name: String,
    delay: Duration,
}

impl SleepyTool {
    pub(crate) fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl Tool for SleepyTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(&self.name, "Sleeps")
    }

    async fn execute(&self, _arguments: Map<String, JsonValue>) -> Result<JsonValue, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok(json!({ "slept_ms": self.delay.as_millis() as u64 }))
    }
}
