use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};

use crate::state::AppState;
use crate::ws::actor;

/// Largest inbound frame accepted from a client.
const MAX_FRAME_BYTES: usize = 64 * 1024;

/// GET /ws
/// WebSocket upgrade endpoint. Identity arrives afterwards in an
/// `authenticate` frame; until then the connection is `Connecting` and
/// subject to the auth watchdog.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| actor::run_connection(socket, state))
}
