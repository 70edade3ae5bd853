//! Webhook administration handlers: CRUD, toggle, test sends, delivery logs.
//!
//! Every handler requires an administrator ([`AdminUser`]).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::api::dto::{
    ClearLogsResponse, EventInfo, LimitParams, WebhookListResponse, WebhookLogsResponse,
    WebhookRequest, event_catalog,
};
use crate::app_state::AppState;
use crate::auth::AdminUser;
use crate::error::{ErrorResponse, GatewayError};
use crate::webhook::model::{NewSubscription, SubscriptionId, TestDeliveryResult, WebhookSubscription};

/// `GET /admin/webhooks`: List subscriptions with the event catalog.
///
/// # Errors
///
/// Returns [`GatewayError`] on storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/admin/webhooks",
    tag = "Webhooks",
    summary = "List webhook subscriptions",
    description = "Returns every subscription with masked secrets, attempt totals, and the events that may be subscribed to.",
    responses(
        (status = 200, description = "Subscriptions and event catalog", body = WebhookListResponse),
        (status = 401, description = "Missing identity", body = ErrorResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
    )
)]
pub async fn list_webhooks(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, GatewayError> {
    let webhooks = state.webhooks.list().await?;
    Ok(Json(WebhookListResponse {
        webhooks,
        available_events: event_catalog(),
    }))
}

/// `GET /admin/webhooks/events`: The subscribable event catalog.
#[utoipa::path(
    get,
    path = "/api/v1/admin/webhooks/events",
    tag = "Webhooks",
    summary = "List subscribable events",
    responses(
        (status = 200, description = "Event catalog", body = Vec<EventInfo>),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
    )
)]
pub async fn list_events(_admin: AdminUser) -> impl IntoResponse {
    Json(event_catalog())
}

/// `POST /admin/webhooks`: Create a subscription.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for unknown events or invalid
/// URL, name, retry or timeout values.
#[utoipa::path(
    post,
    path = "/api/v1/admin/webhooks",
    tag = "Webhooks",
    summary = "Create a webhook subscription",
    request_body = WebhookRequest,
    responses(
        (status = 201, description = "Subscription created", body = WebhookSubscription),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
    )
)]
pub async fn create_webhook(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(req): Json<WebhookRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let input = NewSubscription::try_from(req)?;
    let created = state.webhooks.create(input, admin).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /admin/webhooks/{id}`: Fetch one subscription.
///
/// # Errors
///
/// Returns [`GatewayError::SubscriptionNotFound`] for unknown IDs.
#[utoipa::path(
    get,
    path = "/api/v1/admin/webhooks/{id}",
    tag = "Webhooks",
    summary = "Get a webhook subscription",
    params(
        ("id" = uuid::Uuid, Path, description = "Subscription UUID"),
    ),
    responses(
        (status = 200, description = "Subscription", body = WebhookSubscription),
        (status = 404, description = "Subscription not found", body = ErrorResponse),
    )
)]
pub async fn get_webhook(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let subscription = state.webhooks.get(SubscriptionId::from_uuid(id)).await?;
    Ok(Json(subscription))
}

/// `PUT /admin/webhooks/{id}`: Replace a subscription's settings.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for invalid input and
/// [`GatewayError::SubscriptionNotFound`] for unknown IDs.
#[utoipa::path(
    put,
    path = "/api/v1/admin/webhooks/{id}",
    tag = "Webhooks",
    summary = "Update a webhook subscription",
    description = "Replaces every setting. Omitting `secret` keeps the current one.",
    params(
        ("id" = uuid::Uuid, Path, description = "Subscription UUID"),
    ),
    request_body = WebhookRequest,
    responses(
        (status = 200, description = "Subscription updated", body = WebhookSubscription),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Subscription not found", body = ErrorResponse),
    )
)]
pub async fn update_webhook(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<WebhookRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let input = NewSubscription::try_from(req)?;
    let updated = state
        .webhooks
        .update(SubscriptionId::from_uuid(id), input)
        .await?;
    Ok(Json(updated))
}

/// `DELETE /admin/webhooks/{id}`: Delete a subscription.
///
/// # Errors
///
/// Returns [`GatewayError::SubscriptionNotFound`] for unknown IDs.
#[utoipa::path(
    delete,
    path = "/api/v1/admin/webhooks/{id}",
    tag = "Webhooks",
    summary = "Delete a webhook subscription",
    params(
        ("id" = uuid::Uuid, Path, description = "Subscription UUID"),
    ),
    responses(
        (status = 204, description = "Subscription deleted"),
        (status = 404, description = "Subscription not found", body = ErrorResponse),
    )
)]
pub async fn delete_webhook(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    state.webhooks.delete(SubscriptionId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /admin/webhooks/{id}/toggle`: Flip the active flag.
///
/// # Errors
///
/// Returns [`GatewayError::SubscriptionNotFound`] for unknown IDs.
#[utoipa::path(
    put,
    path = "/api/v1/admin/webhooks/{id}/toggle",
    tag = "Webhooks",
    summary = "Activate or deactivate a subscription",
    params(
        ("id" = uuid::Uuid, Path, description = "Subscription UUID"),
    ),
    responses(
        (status = 200, description = "Subscription toggled", body = WebhookSubscription),
        (status = 404, description = "Subscription not found", body = ErrorResponse),
    )
)]
pub async fn toggle_webhook(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let toggled = state.webhooks.toggle(SubscriptionId::from_uuid(id)).await?;
    Ok(Json(toggled))
}

/// `POST /admin/webhooks/{id}/test`: Send one synchronous test delivery.
///
/// A failed delivery is reported in the body, not as an HTTP error.
///
/// # Errors
///
/// Returns [`GatewayError::SubscriptionNotFound`] for unknown IDs.
#[utoipa::path(
    post,
    path = "/api/v1/admin/webhooks/{id}/test",
    tag = "Webhooks",
    summary = "Send a test delivery",
    description = "Delivers a `test` event once, without retries or logging, and returns the outcome.",
    params(
        ("id" = uuid::Uuid, Path, description = "Subscription UUID"),
    ),
    responses(
        (status = 200, description = "Delivery outcome", body = TestDeliveryResult),
        (status = 404, description = "Subscription not found", body = ErrorResponse),
    )
)]
pub async fn test_webhook(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let result = state.webhooks.test(SubscriptionId::from_uuid(id)).await?;
    Ok(Json(result))
}

/// `GET /admin/webhooks/{id}/logs`: Recent delivery attempts.
///
/// # Errors
///
/// Returns [`GatewayError::SubscriptionNotFound`] for unknown IDs.
#[utoipa::path(
    get,
    path = "/api/v1/admin/webhooks/{id}/logs",
    tag = "Webhooks",
    summary = "List delivery attempts",
    params(
        ("id" = uuid::Uuid, Path, description = "Subscription UUID"),
        LimitParams,
    ),
    responses(
        (status = 200, description = "Delivery log, newest first", body = WebhookLogsResponse),
        (status = 404, description = "Subscription not found", body = ErrorResponse),
    )
)]
pub async fn list_logs(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Query(params): Query<LimitParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let logs = state
        .webhooks
        .logs(SubscriptionId::from_uuid(id), params.limit)
        .await?;
    Ok(Json(WebhookLogsResponse {
        count: logs.len(),
        logs,
    }))
}

/// `DELETE /admin/webhooks/{id}/logs`: Purge the delivery log.
///
/// # Errors
///
/// Returns [`GatewayError::SubscriptionNotFound`] for unknown IDs.
#[utoipa::path(
    delete,
    path = "/api/v1/admin/webhooks/{id}/logs",
    tag = "Webhooks",
    summary = "Clear delivery attempts",
    params(
        ("id" = uuid::Uuid, Path, description = "Subscription UUID"),
    ),
    responses(
        (status = 200, description = "Entries removed", body = ClearLogsResponse),
        (status = 404, description = "Subscription not found", body = ErrorResponse),
    )
)]
pub async fn clear_logs(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let deleted = state
        .webhooks
        .clear_logs(SubscriptionId::from_uuid(id))
        .await?;
    Ok(Json(ClearLogsResponse { deleted }))
}

/// Webhook admin routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/webhooks", get(list_webhooks).post(create_webhook))
        .route("/webhooks/events", get(list_events))
        .route(
            "/webhooks/{id}",
            get(get_webhook).put(update_webhook).delete(delete_webhook),
        )
        .route("/webhooks/{id}/toggle", put(toggle_webhook))
        .route("/webhooks/{id}/test", post(test_webhook))
        .route("/webhooks/{id}/logs", get(list_logs).delete(clear_logs))
}
