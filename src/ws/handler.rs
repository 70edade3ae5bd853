//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;

use super::connection::{ConnectionHandle, run_connection};
use crate::app_state::AppState;
use crate::auth::AuthenticatedUser;

/// Protocol-level frame cap, as a multiple of the validated cap. Frames
/// between the two get an error frame; larger ones close the socket.
const PROTOCOL_FRAME_FACTOR: usize = 8;

/// `GET /ws`: Upgrade an authenticated HTTP connection to WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    user: AuthenticatedUser,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let settings = state.connection_settings.clone();
    let (handle, mailbox) =
        ConnectionHandle::new(user.user_id, user.role, settings.mailbox_capacity);
    let hub = Arc::clone(&state.hub);

    ws.max_message_size(settings.max_frame_bytes.saturating_mul(PROTOCOL_FRAME_FACTOR))
        .on_upgrade(move |socket| run_connection(socket, hub, handle, mailbox, settings))
}
