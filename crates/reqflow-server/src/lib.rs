//! HTTP and WebSocket surface for the reqflow assistant.
//!
//! Each `/ws/chat` connection gets its own session and [`ConversationAgent`];
//! stage operations are exposed over plain HTTP and a JSON envelope endpoint.
//! Conversations persist through [`SqliteStore`].
//!
//! [`ConversationAgent`]: reqflow_agent::ConversationAgent

pub mod db;
pub mod message;
pub mod routes;
pub mod state;

use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

pub use db::SqliteStore;
pub use message::{MessageKind, WsMessage};
pub use state::{AppState, ConnectionRegistry};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/stats", get(routes::stats))
        .route("/ws/chat", get(routes::ws_chat))
        .route("/broadcast", post(routes::broadcast))
        .route("/api/rpc", post(routes::rpc))
        .route("/api/pipeline/run", post(routes::run_pipeline))
        .route("/api/pipeline/:method", post(routes::stage_method))
        .route("/api/conversations/:id", get(routes::get_conversation))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    tracing::info!("chat socket at ws://{}/ws/chat", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
