//! # Relay Web Server
//!
//! HTTP and WebSocket boundary in front of the relay.
//!
//! ## Endpoints
//!
//! | Path | Description |
//! |------|-------------|
//! | `/`, `/ws` | WebSocket push channel, one text frame per record |
//! | `/enviar-mensaje` | `POST {"message": ...}`: broadcast and write to the device |
//! | `/status` | Device link state and relay counters as JSON |
//!
//! CORS is permissive on every route so a page served from anywhere can talk
//! to the relay.

use crate::core::relay::RelayHandle;
use crate::domain::model::{ErrorBody, Submission, SubmitAck};
use crate::utils::error::{RelayError, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared state passed to all request handlers.
#[derive(Clone)]
struct AppState {
    relay: RelayHandle,
}

pub fn router(relay: RelayHandle) -> Router {
    Router::new()
        .route("/", get(handle_websocket))
        .route("/ws", get(handle_websocket))
        .route("/enviar-mensaje", post(handle_submit))
        .route("/status", get(handle_status))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { relay })
}

/// Serves until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, relay: RelayHandle, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("✅ Relay listening on http://{}", addr);
    }

    axum::serve(listener, router(relay))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn handle_submit(
    State(state): State<AppState>,
    Json(submission): Json<Submission>,
) -> Response {
    match state.relay.submit(submission.message).await {
        Ok(()) => Json(SubmitAck::ok()).into_response(),
        Err(e) => {
            tracing::warn!("⚠️ Message broadcast but not delivered to device: {}", e);
            error_response(&e)
        }
    }
}

async fn handle_status(State(state): State<AppState>) -> Response {
    match state.relay.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => error_response(&e),
    }
}

fn error_response(error: &RelayError) -> Response {
    let status = match error {
        RelayError::RelayUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ErrorBody {
        message: error.to_string(),
    };
    (status, Json(body)).into_response()
}

async fn handle_websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_client_socket(socket, state.relay))
}

/// Forwards broadcasts to one client until either side goes away.
async fn handle_client_socket(mut socket: WebSocket, relay: RelayHandle) {
    let mut channel = match relay.register().await {
        Ok(channel) => channel,
        Err(e) => {
            tracing::warn!("Rejecting WebSocket client: {}", e);
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    let id = channel.id();
    tracing::info!("✅ Client {} connected", id);

    loop {
        tokio::select! {
            text = channel.recv() => match text {
                Some(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break; // Client disconnected
                    }
                }
                None => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {} // clients only listen on this channel
            },
        }
    }

    relay.unregister(id);
    tracing::info!("Client {} disconnected", id);
}
