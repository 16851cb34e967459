//! HTTP routes.
//!
//! Chat routes address one session's actor. Session routes manage the
//! directory. Every JSON response carries a `success` flag.

use crate::error::ApiError;
use crate::hub::SessionHub;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::StreamExt;
use parlance_conversation::{TurnError, session_title};
use parlance_core::SessionId;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared handler state.
pub type AppState = Arc<SessionHub>;

/// Builds the application router.
pub fn router(hub: AppState) -> Router {
    Router::new()
        .route("/api/chat/{session_id}/chat", post(chat))
        .route("/api/chat/{session_id}/messages", get(messages))
        .route("/api/chat/{session_id}/model", post(set_model))
        .route("/api/chat/{session_id}/clear", post(clear))
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/all", delete(delete_all_sessions))
        .route("/api/sessions/{session_id}", delete(delete_session))
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}

fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    raw.parse().map_err(|e: parlance_core::ParseIdError| ApiError::InvalidSessionId {
        reason: e.reason,
    })
}

/// Body of a chat request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// User message.
    pub message: String,
    /// Model for this and later turns.
    #[serde(default)]
    pub model: Option<String>,
    /// Stream the reply as plain text.
    #[serde(default)]
    pub stream: bool,
}

async fn chat(
    State(hub): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let actor = hub.actor(&session_id).await;

    let model = request.model.filter(|m| !m.trim().is_empty());
    if request.stream {
        let (feed, ticket) = actor.stream_turn(request.message.clone(), model).await?;
        register_activity(&hub, &session_id, &request.message).await;

        tokio::spawn(async move {
            if let Err(e) = ticket.wait().await {
                warn!(session_id = %session_id, error = %e, "streamed turn ended with an error");
            }
        });

        let body = Body::from_stream(UnboundedReceiverStream::new(feed).map(Ok::<_, Infallible>));
        return Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response());
    }

    let turn = actor.process_turn(request.message.clone(), model).await;
    if !matches!(&turn, Err(e) if e.current_context().is_rejection()) {
        register_activity(&hub, &session_id, &request.message).await;
    }
    turn?;

    let state = actor.get_state().await?;
    Ok(Json(json!({ "success": true, "data": state })).into_response())
}

/// Registers the session on first use and marks it active.
async fn register_activity(hub: &SessionHub, session_id: &SessionId, first_message: &str) {
    let title = session_title(None, Some(first_message));
    if let Err(e) = hub.register(session_id.clone(), title).await {
        warn!(session_id = %session_id, error = %e, "failed to register session");
    }
    hub.touch(session_id).await;
}

async fn messages(
    State(hub): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let state = hub.actor(&session_id).await.get_state().await?;
    Ok(Json(json!({ "success": true, "data": state })))
}

/// Body of a model change.
#[derive(Debug, Deserialize)]
pub struct ModelRequest {
    /// Model identifier.
    pub model: String,
}

async fn set_model(
    State(hub): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ModelRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let model = request.model.trim();
    if model.is_empty() {
        return Err(ApiError::Turn(TurnError::InvalidInput {
            reason: "model must not be empty".to_string(),
        }));
    }
    let state = hub.actor(&session_id).await.set_model(model).await?;
    Ok(Json(json!({ "success": true, "data": state })))
}

async fn clear(
    State(hub): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let state = hub.actor(&session_id).await.clear().await?;
    Ok(Json(json!({ "success": true, "data": state })))
}

async fn list_sessions(State(hub): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let sessions = hub.list().await?;
    Ok(Json(json!({ "success": true, "data": sessions })))
}

/// Body of a session creation request. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Explicit title.
    #[serde(default)]
    pub title: Option<String>,
    /// Caller-chosen identifier; generated when absent.
    #[serde(default)]
    pub session_id: Option<String>,
    /// First message, used to derive a title.
    #[serde(default)]
    pub first_message: Option<String>,
}

async fn create_session(
    State(hub): State<AppState>,
    request: Option<Json<CreateSessionRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(request) = request.unwrap_or_default();
    let session_id = match request.session_id.as_deref() {
        Some(raw) => parse_session_id(raw)?,
        None => SessionId::generate(),
    };
    let title = session_title(request.title.as_deref(), request.first_message.as_deref());
    let info = hub.register(session_id, title).await?;
    info!(session_id = %info.id, "session registered");
    Ok(Json(json!({
        "success": true,
        "data": { "sessionId": info.id, "title": info.title },
    })))
}

async fn delete_all_sessions(
    State(hub): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = hub.clear().await?;
    info!(deleted, "all sessions cleared");
    Ok(Json(json!({ "success": true, "data": { "deleted": deleted } })))
}

async fn delete_session(
    State(hub): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let deleted = hub.remove(&session_id).await?;
    Ok(Json(json!({ "success": deleted, "data": { "deleted": deleted } })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DownClient, EchoClient, orchestrator};
    use axum::http::{Method, Request, StatusCode};
    use parlance_ai::CompletionClient;
    use parlance_conversation::InMemorySessionDirectory;
    use serde_json::Value as JsonValue;
    use tower::ServiceExt;

    fn app(client: Arc<dyn CompletionClient>) -> Router {
        let hub = SessionHub::new(
            orchestrator(client),
            Arc::new(InMemorySessionDirectory::new()),
        );
        router(Arc::new(hub))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<JsonValue>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        app.clone().oneshot(request).await.expect("response")
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body")
            .to_vec()
    }

    async fn json_body(response: Response) -> JsonValue {
        serde_json::from_slice(&body_bytes(response).await).expect("json")
    }

    #[tokio::test]
    async fn chat_returns_session_state() {
        let app = app(Arc::new(EchoClient));
        let response = send(
            &app,
            Method::POST,
            "/api/chat/s1/chat",
            Some(json!({ "message": "hello" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        let messages = body["data"]["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["content"], "echo: hello");
        assert_eq!(body["data"]["isProcessing"], false);
    }

    #[tokio::test]
    async fn streamed_chat_returns_plain_text() {
        let app = app(Arc::new(EchoClient));
        let response = send(
            &app,
            Method::POST,
            "/api/chat/s1/chat",
            Some(json!({ "message": "hi", "stream": true })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        let text = String::from_utf8(body_bytes(response).await).expect("utf8");
        assert_eq!(text, "echo: hi");

        // The feed closes before the actor commits; poll until it has.
        let mut state = JsonValue::Null;
        for _ in 0..50 {
            state = json_body(send(&app, Method::GET, "/api/chat/s1/messages", None).await).await;
            if state["data"]["isProcessing"] == false {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(state["data"]["messages"][1]["content"], "echo: hi");
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let app = app(Arc::new(EchoClient));
        let response = send(
            &app,
            Method::POST,
            "/api/chat/s1/chat",
            Some(json!({ "message": "   " })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);

        let listed = json_body(send(&app, Method::GET, "/api/sessions", None).await).await;
        assert!(listed["data"].as_array().expect("sessions").is_empty());
    }

    #[tokio::test]
    async fn provider_outage_is_bad_gateway_and_still_commits() {
        let app = app(Arc::new(DownClient));
        let response = send(
            &app,
            Method::POST,
            "/api/chat/s1/chat",
            Some(json!({ "message": "hello" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let state = json_body(send(&app, Method::GET, "/api/chat/s1/messages", None).await).await;
        let messages = state["data"]["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["content"], "Sorry, I encountered an error.");
    }

    #[tokio::test]
    async fn invalid_session_id_is_rejected() {
        let app = app(Arc::new(EchoClient));
        let response = send(&app, Method::GET, "/api/chat/bad%20id/messages", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn model_and_clear() {
        let app = app(Arc::new(EchoClient));
        let body = json_body(
            send(
                &app,
                Method::POST,
                "/api/chat/s1/model",
                Some(json!({ "model": "openai/gpt-4o" })),
            )
            .await,
        )
        .await;
        assert_eq!(body["data"]["model"], "openai/gpt-4o");

        send(
            &app,
            Method::POST,
            "/api/chat/s1/chat",
            Some(json!({ "message": "hello" })),
        )
        .await;
        let body = json_body(send(&app, Method::POST, "/api/chat/s1/clear", None).await).await;
        assert!(body["data"]["messages"].as_array().expect("messages").is_empty());
        assert_eq!(body["data"]["model"], "openai/gpt-4o");
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let app = app(Arc::new(EchoClient));
        let created = json_body(
            send(
                &app,
                Method::POST,
                "/api/sessions",
                Some(json!({ "sessionId": "s1", "firstMessage": "Plan a trip to the mountains" })),
            )
            .await,
        )
        .await;
        assert_eq!(created["data"]["sessionId"], "s1");
        assert_eq!(created["data"]["title"], "Plan a trip to the mountains...");

        let generated = json_body(send(&app, Method::POST, "/api/sessions", None).await).await;
        assert!(
            generated["data"]["sessionId"]
                .as_str()
                .expect("id")
                .starts_with("sess_")
        );

        let listed = json_body(send(&app, Method::GET, "/api/sessions", None).await).await;
        assert_eq!(listed["data"].as_array().expect("sessions").len(), 2);

        let deleted = json_body(send(&app, Method::DELETE, "/api/sessions/s1", None).await).await;
        assert_eq!(deleted["success"], true);
        let again = json_body(send(&app, Method::DELETE, "/api/sessions/s1", None).await).await;
        assert_eq!(again["data"]["deleted"], false);

        let cleared = json_body(send(&app, Method::DELETE, "/api/sessions/all", None).await).await;
        assert_eq!(cleared["data"]["deleted"], 1);
    }
}
