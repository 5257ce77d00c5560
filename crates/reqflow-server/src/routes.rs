//! HTTP and WebSocket handlers.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use reqflow_pipeline::{dispatch_method, handle_line, PipelineInput};
use reqflow_types::ReqflowError;

use crate::message::{MessageKind, WsMessage};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// `{"error": ...}` with a status derived from the failure.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ReqflowError> for ApiError {
    fn from(e: ReqflowError) -> Self {
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "reqflow",
        "active_sessions": state.connections.active(),
    }))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let store = state.store.stats().await?;
    Ok(Json(json!({
        "active_sessions": state.connections.active(),
        "total_connections": state.connections.total(),
        "conversations": store.conversations,
        "messages": store.messages,
    })))
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Full run. A failing stage answers with its status, the stage name and the
/// outputs computed before it.
pub async fn run_pipeline(
    State(state): State<AppState>,
    Json(input): Json<PipelineInput>,
) -> Response {
    match state.orchestrator.run_pipeline(input).await {
        Ok(result) => Json(json!({ "ok": true, "result": result })).into_response(),
        Err(failure) => {
            let message = failure.describe();
            let stage = failure.stage.as_str();
            let partial = serde_json::to_value(&failure.partial).unwrap_or(Value::Null);
            let status = StatusCode::from_u16(failure.into_error().http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                Json(json!({ "error": message, "stage": stage, "partial": partial })),
            )
                .into_response()
        }
    }
}

/// One stage operation by method name.
pub async fn stage_method(
    State(state): State<AppState>,
    Path(method): Path<String>,
    body: Option<Json<Value>>,
) -> Result<Json<Value>, ApiError> {
    let params = body.map(|Json(v)| v).unwrap_or(Value::Null);
    let response = dispatch_method(&state.orchestrator, &method, &params).await?;
    Ok(Json(response))
}

/// `{id, method, params}` envelope; always 200, failures travel in `error`.
pub async fn rpc(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let line = String::from_utf8_lossy(&body);
    let response = handle_line(&state.orchestrator, &line).await;
    Json(serde_json::to_value(response).unwrap_or(Value::Null))
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let conversation = state
        .store
        .get_conversation(id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("conversation {id} not found")))?;
    let messages = state.store.list_messages(id).await?;
    Ok(Json(json!({ "conversation": conversation, "messages": messages })))
}

// ---------------------------------------------------------------------------
// Broadcast
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct BroadcastParams {
    #[serde(default)]
    message: Option<String>,
}

pub async fn broadcast(
    State(state): State<AppState>,
    Query(params): Query<BroadcastParams>,
) -> Result<Json<Value>, ApiError> {
    let message = params
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "Message is required"))?;

    let recipients = state.connections.broadcast(&WsMessage::system(message));
    tracing::info!(recipients, "Broadcast sent");
    Ok(Json(json!({
        "status": "success",
        "message": "Broadcast sent",
        "recipients": recipients,
    })))
}

// ---------------------------------------------------------------------------
// Chat socket
// ---------------------------------------------------------------------------

pub async fn ws_chat(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_chat_socket(socket, state))
}

pub(crate) fn welcome_text(session_id: &str) -> String {
    let short: String = session_id.chars().take(8).collect();
    format!("Welcome! Your session ID is {short}... Type /help for commands.")
}

async fn handle_chat_socket(ws: WebSocket, state: AppState) {
    let mut agent = state.new_agent();
    let session_id = agent.session_id().to_string();
    tracing::info!(session_id = %session_id, "Chat connection opened");

    let (mut ws_sender, mut ws_receiver) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    state.connections.register(&session_id, tx.clone());

    // Outbound queue → WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.to_json())).await.is_err() {
                break;
            }
        }
    });

    let _ = tx.send(WsMessage::system(welcome_text(&session_id)));

    // WebSocket → agent
    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Text(raw) => {
                let incoming = WsMessage::from_json(&raw);
                if incoming.content.trim().is_empty() || incoming.kind == MessageKind::Typing {
                    continue;
                }
                let _ = tx.send(WsMessage::typing(true));
                let reply = agent.handle_message(&incoming.content).await;
                if tx.send(WsMessage::text(reply)).is_err() {
                    break;
                }
            }
            Message::Binary(_) => {
                let _ = tx.send(WsMessage::error(
                    "Binary frames are not supported",
                    Some("UNSUPPORTED_FRAME"),
                ));
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.connections.unregister(&session_id);
    state.sessions.remove(&session_id);
    send_task.abort();
    tracing::info!(session_id = %session_id, "Chat connection closed");
}
