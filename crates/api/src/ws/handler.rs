use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use brandgen_core::types::UserId;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use crate::ws::manager::WsManager;

/// Browsers cannot set headers on a WebSocket upgrade, so the token rides
/// in the query string.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// GET /api/v1/ws
///
/// Upgrades to a WebSocket that receives every notification event as JSON.
/// A `token` is optional; an invalid one is rejected with 401.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
) -> AppResult<impl IntoResponse> {
    let user_id = match params.token.as_deref() {
        Some(token) => Some(AuthUser::from_token(token, &state.config.jwt)?.user_id),
        None => None,
    };
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager, user_id)))
}

/// Run one connection: a sender task drains the manager channel into the
/// sink while this task reads until the client goes away.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>, user_id: Option<UserId>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, ?user_id, "WebSocket connected");

    let mut rx = ws_manager.add(conn_id.clone(), user_id).await;
    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {
                // Clients signal retries over HTTP; inbound frames are ignored.
            }
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
