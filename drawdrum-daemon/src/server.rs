//! # Display Sync Web Server
//!
//! Axum router exposing the display state to browsers on the local network.
//!
//! ## Endpoints
//!
//! | Path | Description |
//! |------|-------------|
//! | `GET /api/settings` | Current snapshot (same shape as `init`) |
//! | `POST /api/passport` | Replace passport text, prize and formatting |
//! | `POST /api/timer` | Timer start / pause / resume / reset |
//! | `PUT /api/logo` | Point the logo at an already uploaded file |
//! | `DELETE /api/logo` | Remove the logo and its uploaded file |
//! | `GET /uploads/*` | Uploaded images |
//! | `GET /ws` | Push channel for displays and the admin page |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use drawdrum_sync::{
    AdminCommand, EventChannel, InitPayload, LogoUpdate, QueueChannel, SyncCoordinator, SyncError,
    SyncEvent, TextUpdate, TimerCommand,
};

/// Shared state passed to all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SyncCoordinator>,
    pub uploads_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(coordinator: Arc<SyncCoordinator>, uploads_dir: PathBuf) -> Self {
        Self {
            coordinator,
            uploads_dir: Arc::new(uploads_dir),
        }
    }
}

/// Request failure mapped onto an HTTP status
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Logo file not found: {0}")]
    UnknownLogo(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Sync(SyncError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            ApiError::Sync(SyncError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            ApiError::Sync(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::UnknownLogo(_) => StatusCode::BAD_REQUEST,
        };
        let body = Json(json!({ "success": false, "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let uploads = ServeDir::new(state.uploads_dir.as_path());

    Router::new()
        .route("/api/settings", get(get_settings))
        .route("/api/passport", post(post_passport))
        .route("/api/timer", post(post_timer))
        .route("/api/logo", put(put_logo).delete(delete_logo))
        .route("/ws", get(handle_websocket))
        .nest_service("/uploads", uploads)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router on an already bound listener until it fails
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, router(state))
        .await
        .context("HTTP server terminated")
}

async fn get_settings(State(state): State<AppState>) -> Json<InitPayload> {
    Json(state.coordinator.snapshot().await)
}

async fn post_passport(
    State(state): State<AppState>,
    Json(update): Json<TextUpdate>,
) -> impl IntoResponse {
    let settings = state.coordinator.set_text(update).await;
    Json(json!({ "success": true, "settings": settings }))
}

async fn post_timer(
    State(state): State<AppState>,
    Json(command): Json<TimerCommand>,
) -> Result<impl IntoResponse, ApiError> {
    let action = state.coordinator.apply_timer(command).await?;
    Ok(Json(json!({ "success": true, "timer": action })))
}

async fn put_logo(
    State(state): State<AppState>,
    Json(update): Json<LogoUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    if !update.logo_path.is_empty() {
        let stored = drawdrum_paths::resolve_upload(&state.uploads_dir, &update.logo_path)
            .filter(|file| file.is_file());
        if stored.is_none() {
            return Err(ApiError::UnknownLogo(update.logo_path));
        }
    }

    state.coordinator.set_logo(update.logo_path.clone()).await;
    Ok(Json(json!({ "success": true, "logoPath": update.logo_path })))
}

async fn delete_logo(State(state): State<AppState>) -> impl IntoResponse {
    let previous = state.coordinator.set_logo("").await;

    if let Some(file) = drawdrum_paths::resolve_upload(&state.uploads_dir, &previous) {
        match tokio::fs::remove_file(&file).await {
            Ok(()) => info!("Deleted logo file {}", file.display()),
            Err(e) => warn!("Failed to delete logo file {}: {}", file.display(), e),
        }
    }

    Json(json!({ "success": true }))
}

async fn handle_websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manages a single push-channel connection.
///
/// Outbound events flow through a queue drained by a writer task; inbound
/// admin messages are applied to the coordinator, and rejections are queued
/// back to this connection only.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (channel, mut events) = QueueChannel::open();

    let id = match state.coordinator.subscribe(Arc::new(channel.clone())).await {
        Ok((id, _)) => id,
        Err(e) => {
            warn!("Failed to subscribe connection: {}", e);
            return;
        }
    };
    debug!("Connection {} subscribed", id);

    let mut writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to serialize {}: {}", event.kind(), e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let coordinator = Arc::clone(&state.coordinator);
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => handle_inbound(&coordinator, &channel, text.as_str()).await,
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    state.coordinator.unsubscribe(id).await;
    debug!("Connection {} closed", id);
}

async fn handle_inbound(coordinator: &SyncCoordinator, reply: &QueueChannel, text: &str) {
    debug!("Inbound message: {}", text);

    let result = match AdminCommand::from_json(text) {
        Ok(command) => coordinator.handle_command(command).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        warn!("Rejected inbound message: {}", e);
        let event = SyncEvent::Error {
            message: e.to_string(),
        };
        if let Err(e) = reply.send(&event) {
            debug!("Could not report rejection: {}", e);
        }
    }
}
