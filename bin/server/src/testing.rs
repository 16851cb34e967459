//! Test doubles for the server's unit tests.

use async_trait::async_trait;
use parlance_ai::{
    ChatRole, CompletionClient, CompletionError, CompletionMessage, CompletionRequest, Delta,
    DeltaStream,
};
use parlance_conversation::{BuiltinTools, ConversationOrchestrator, OrchestratorConfig};
use rootcause::Report;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};

/// Replies with `echo: <last user message>`.
pub(crate) struct EchoClient;

impl EchoClient {
    fn reply(request: &CompletionRequest) -> String {
        let last = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .and_then(|m| m.content.clone())
            .unwrap_or_default();
        format!("echo: {last}")
    }
}

#[async_trait]
impl CompletionClient for EchoClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Option<CompletionMessage>, Report<CompletionError>> {
        Ok(Some(CompletionMessage {
            content: Some(Self::reply(request)),
            tool_calls: Vec::new(),
        }))
    }

    async fn stream_complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<DeltaStream, Report<CompletionError>> {
        let reply = Self::reply(request);
        let (head, tail) = reply.split_at(reply.len().min(6));
        let (tx, rx) = mpsc::channel(2);
        tx.try_send(Ok(Delta::text(head))).expect("capacity");
        tx.try_send(Ok(Delta::text(tail))).expect("capacity");
        Ok(rx)
    }
}

/// Echoes like [`EchoClient`] once a permit is available on its gate.
pub(crate) struct GatedClient {
    pub(crate) gate: Arc<Semaphore>,
}

impl GatedClient {
    pub(crate) fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
        }
    }
}

#[async_trait]
impl CompletionClient for GatedClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Option<CompletionMessage>, Report<CompletionError>> {
        self.gate.acquire().await.expect("gate open").forget();
        EchoClient.complete(request).await
    }

    async fn stream_complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<DeltaStream, Report<CompletionError>> {
        self.gate.acquire().await.expect("gate open").forget();
        EchoClient.stream_complete(request).await
    }
}

/// Always fails as if the provider were down.
pub(crate) struct DownClient;

#[async_trait]
impl CompletionClient for DownClient {
    async fn complete(
        &self,
        _request: &CompletionRequest,
    ) -> Result<Option<CompletionMessage>, Report<CompletionError>> {
        Err(CompletionError::ProviderUnavailable {
            provider: "test".to_string(),
            reason: "connection refused".to_string(),
        }
        .into())
    }

    async fn stream_complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<DeltaStream, Report<CompletionError>> {
        self.complete(request).await.map(|_| mpsc::channel(1).1)
    }
}

pub(crate) fn orchestrator(client: Arc<dyn CompletionClient>) -> Arc<ConversationOrchestrator> {
    let tools = BuiltinTools::unconfigured(reqwest::Client::new()).into_registry();
    Arc::new(ConversationOrchestrator::new(
        client,
        tools,
        OrchestratorConfig::default(),
    ))
}
