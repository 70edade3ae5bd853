//! Live push handlers: personal notifications, announcements, presence.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{AnnouncementRequest, NotificationRequest, OnlineResponse, PushResponse};
use crate::app_state::AppState;
use crate::auth::AdminUser;
use crate::error::{ErrorResponse, GatewayError};

/// `POST /admin/notifications`: Push a notification to one user.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] when the title or message is
/// blank.
#[utoipa::path(
    post,
    path = "/api/v1/admin/notifications",
    tag = "Notifications",
    summary = "Notify a user",
    description = "Delivers a notification frame to the user's connection, if online, and raises `notification.sent` for webhook subscribers.",
    request_body = NotificationRequest,
    responses(
        (status = 200, description = "Push outcome", body = PushResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
    )
)]
pub async fn notify_user(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(req): Json<NotificationRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    require_text(&req.title, "title")?;
    require_text(&req.message, "message")?;
    let report = state
        .events
        .notify_user(req.user_id.clone(), req.payload())
        .await;
    Ok(Json(PushResponse {
        delivered: report.live_recipients,
        webhook_queued: report.webhook_queued,
    }))
}

/// `POST /admin/announcements`: Broadcast to everyone or to one role.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] when the title or message is
/// blank.
#[utoipa::path(
    post,
    path = "/api/v1/admin/announcements",
    tag = "Notifications",
    summary = "Broadcast an announcement",
    request_body = AnnouncementRequest,
    responses(
        (status = 200, description = "Push outcome", body = PushResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
    )
)]
pub async fn announce(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(req): Json<AnnouncementRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    require_text(&req.title, "title")?;
    require_text(&req.message, "message")?;
    let data = serde_json::json!({
        "title": req.title,
        "message": req.message,
    });
    let delivered = state.events.announce(req.role, data).await;
    Ok(Json(PushResponse {
        delivered,
        webhook_queued: false,
    }))
}

/// `GET /admin/ws/online`: Connected identities and hub counters.
#[utoipa::path(
    get,
    path = "/api/v1/admin/ws/online",
    tag = "Notifications",
    summary = "List online users",
    responses(
        (status = 200, description = "Online identities", body = OnlineResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
    )
)]
pub async fn online_users(_admin: AdminUser, State(state): State<AppState>) -> impl IntoResponse {
    Json(OnlineResponse {
        users: state.hub.online_users().await,
        stats: state.hub.stats().await,
    })
}

fn require_text(value: &str, field: &str) -> Result<(), GatewayError> {
    if value.trim().is_empty() {
        return Err(GatewayError::InvalidRequest(format!("{field} is required")));
    }
    Ok(())
}

/// Notification and presence routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", post(notify_user))
        .route("/announcements", post(announce))
        .route("/ws/online", get(online_users))
}
