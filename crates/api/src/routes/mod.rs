pub mod admin;
pub mod health;
pub mod requests;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                                   event WebSocket (?token= optional)
///
/// /requests                             create + submit, list own (auth)
/// /requests/{id}                        get (owner or admin)
/// /requests/{id}/retry                  manual retry signal (owner or admin)
///
/// /admin/requests                       queue (?status=), clear (?confirm=true)
/// /admin/requests/{id}/status           set status (PATCH)
/// /admin/requests/{id}/result           upload result (multipart POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/requests", requests::router())
        .nest("/admin", admin::router())
}
