//! OpenAI-compatible chat-completions client.
//!
//! Works against any gateway exposing `POST {base_url}/chat/completions`,
//! blocking or with `stream: true` (SSE with `data: [DONE]` terminator).

use crate::backend::{CompletionClient, CompletionMessage, CompletionRequest, DeltaStream};
use crate::delta::{Delta, ToolCallDelta};
use crate::error::CompletionError;
use crate::sse::{self, SseReader};
use async_trait::async_trait;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::AsyncBufRead;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

/// Capacity of the channel between the SSE reader task and the consumer.
const DELTA_CHANNEL_CAPACITY: usize = 64;

/// Stream terminator sent by OpenAI-compatible gateways.
const DONE_MARKER: &str = "[DONE]";

/// Configuration for the provider connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL, e.g. `https://gateway.example.com/v1`.
    pub base_url: String,
    /// Bearer token, if the gateway requires one.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Timeout for a blocking completion request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl ProviderConfig {
    /// Creates a configuration for the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// HTTP client for an OpenAI-compatible gateway.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    config: ProviderConfig,
}

impl OpenAiCompatibleClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: ProviderConfig) -> Result<Self, Report<CompletionError>> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CompletionError::ProviderUnavailable {
                provider: config.base_url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self { http, config })
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, CompletionError> {
        let mut builder = self.http.post(self.config.completions_url()).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(CompletionError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text: String = text.chars().take(200).collect();
            return Err(CompletionError::RequestFailed {
                reason: format!("HTTP {status}: {text}"),
            });
        }

        Ok(response)
    }

    fn transport_error(&self, e: reqwest::Error) -> CompletionError {
        if e.is_timeout() {
            CompletionError::Timeout {
                after_secs: self.config.request_timeout_secs,
            }
        } else if e.is_connect() {
            CompletionError::ProviderUnavailable {
                provider: self.config.base_url.clone(),
                reason: e.to_string(),
            }
        } else {
            CompletionError::RequestFailed {
                reason: e.to_string(),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct ChunkBody {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChunkToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    index: Option<usize>,
    id: Option<String>,
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    name: Option<String>,
    arguments: Option<String>,
}

/// Converts one SSE payload into zero or more deltas.
fn parse_chunk(data: &str) -> Result<Vec<Delta>, CompletionError> {
    let chunk: ChunkBody =
        serde_json::from_str(data).map_err(|e| CompletionError::ResponseParseFailed {
            reason: e.to_string(),
        })?;

    let mut deltas = Vec::new();
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(deltas);
    };

    if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
        deltas.push(Delta::text(text));
    }

    for (position, call) in choice.delta.tool_calls.into_iter().enumerate() {
        let (name, arguments) = call
            .function
            .map(|f| (f.name, f.arguments))
            .unwrap_or_default();
        deltas.push(Delta::ToolCall(ToolCallDelta {
            index: call.index.unwrap_or(position),
            id: call.id,
            name,
            arguments,
        }));
    }

    Ok(deltas)
}

/// Reads SSE events and forwards deltas until `[DONE]`, end of input, or the
/// consumer going away.
async fn pump_deltas<R: AsyncBufRead + Unpin>(
    mut reader: SseReader<R>,
    tx: &mpsc::Sender<Result<Delta, CompletionError>>,
) -> Result<(), CompletionError> {
    while let Some(event) = reader.next_event().await? {
        if event.data.trim() == DONE_MARKER {
            break;
        }
        for delta in parse_chunk(&event.data)? {
            if tx.send(Ok(delta)).await.is_err() {
                debug!("delta consumer dropped, stopping stream");
                return Ok(());
            }
        }
    }
    Ok(())
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    #[instrument(skip(self, request), fields(model = %request.model, messages = request.messages.len()))]
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Option<CompletionMessage>, Report<CompletionError>> {
        let mut request = request.clone();
        request.stream = false;

        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        let response = self.send(&request, Some(timeout)).await?;

        let body: CompletionBody =
            response
                .json()
                .await
                .map_err(|e| CompletionError::ResponseParseFailed {
                    reason: e.to_string(),
                })?;

        Ok(body.choices.into_iter().next().and_then(|c| c.message))
    }

    #[instrument(skip(self, request), fields(model = %request.model, messages = request.messages.len()))]
    async fn stream_complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<DeltaStream, Report<CompletionError>> {
        let mut request = request.clone();
        request.stream = true;

        let response = self.send(&request, None).await?;
        let (tx, rx) = mpsc::channel(DELTA_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            if let Err(e) = pump_deltas(sse::from_response(response), &tx).await {
                warn!(error = %e, "completion stream failed");
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_url_trims_trailing_slash() {
        let config = ProviderConfig::new("https://gw.example.com/v1/");
        assert_eq!(
            config.completions_url(),
            "https://gw.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn parse_chunk_text_and_tool_fragments() {
        let deltas = parse_chunk(
            r#"{"choices":[{"delta":{"content":"Hi","tool_calls":[
                {"index":2,"id":"call_a","function":{"name":"get_weather","arguments":"{\"lo"}}
            ]}}]}"#,
        )
        .expect("parse");

        assert_eq!(deltas[0], Delta::text("Hi"));
        assert_eq!(
            deltas[1],
            Delta::ToolCall(
                ToolCallDelta::new(2)
                    .with_id("call_a")
                    .with_name("get_weather")
                    .with_arguments("{\"lo")
            )
        );
    }

    #[test]
    fn parse_chunk_without_index_uses_position() {
        let deltas = parse_chunk(
            r#"{"choices":[{"delta":{"tool_calls":[{"function":{"arguments":"1}"}}]}}]}"#,
        )
        .expect("parse");
        assert_eq!(
            deltas,
            vec![Delta::ToolCall(ToolCallDelta::new(0).with_arguments("1}"))]
        );
    }

    #[test]
    fn parse_chunk_empty_choices_and_role_only() {
        assert!(parse_chunk(r#"{"choices":[]}"#).expect("parse").is_empty());
        assert!(
            parse_chunk(r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#)
                .expect("parse")
                .is_empty()
        );
    }

    #[test]
    fn parse_chunk_rejects_garbage() {
        assert!(matches!(
            parse_chunk("not json"),
            Err(CompletionError::ResponseParseFailed { .. })
        ));
    }

    #[tokio::test]
    async fn pump_stops_at_done_marker() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Xin \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"chao\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        let (tx, mut rx) = mpsc::channel(8);

        pump_deltas(SseReader::new(body.as_bytes()), &tx)
            .await
            .expect("pump");
        drop(tx);

        let mut text = String::new();
        while let Some(item) = rx.recv().await {
            if let Delta::Text { text: t } = item.expect("delta") {
                text.push_str(&t);
            }
        }
        assert_eq!(text, "Xin chao");
    }
}
