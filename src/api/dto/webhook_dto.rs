//! Request and response bodies for the webhook admin endpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::EventType;
use crate::error::GatewayError;
use crate::webhook::model::{DeliveryLogEntry, NewSubscription, SubscriptionSummary};

/// Body of `POST /admin/webhooks` and `PUT /admin/webhooks/{id}`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WebhookRequest {
    /// Display name.
    pub name: String,
    /// Target URL (`http://` or `https://`).
    pub url: String,
    /// Signing secret. On update, omit to keep the current one.
    #[serde(default)]
    pub secret: Option<String>,
    /// Event tags, e.g. `["portfolio.approved"]`.
    pub events: Vec<String>,
    /// Defaults to `true`.
    #[serde(default)]
    pub is_active: Option<bool>,
    /// Total attempts per dispatch (default 3).
    #[serde(default)]
    pub retry_count: Option<u32>,
    /// Per-attempt timeout in seconds (default 30).
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl TryFrom<WebhookRequest> for NewSubscription {
    type Error = GatewayError;

    fn try_from(req: WebhookRequest) -> Result<Self, Self::Error> {
        let events = req
            .events
            .iter()
            .map(|tag| {
                tag.parse::<EventType>()
                    .map_err(|e| GatewayError::InvalidRequest(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: req.name,
            url: req.url,
            secret: req.secret,
            events,
            is_active: req.is_active.unwrap_or(true),
            retry_count: req.retry_count.unwrap_or(0),
            timeout_seconds: req.timeout_seconds.unwrap_or(0),
            headers: req.headers,
        })
    }
}

/// One entry of the event catalog.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventInfo {
    /// Wire tag.
    pub value: String,
    /// Human-readable label.
    pub label: String,
}

impl From<EventType> for EventInfo {
    fn from(event: EventType) -> Self {
        Self {
            value: event.as_str().to_string(),
            label: event.label().to_string(),
        }
    }
}

/// The full event catalog.
#[must_use]
pub fn event_catalog() -> Vec<EventInfo> {
    EventType::ALL.into_iter().map(EventInfo::from).collect()
}

/// Body of `GET /admin/webhooks`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookListResponse {
    /// Subscriptions with masked secrets and attempt totals.
    pub webhooks: Vec<SubscriptionSummary>,
    /// Events that may be subscribed to.
    pub available_events: Vec<EventInfo>,
}

/// Body of `GET /admin/webhooks/{id}/logs`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookLogsResponse {
    /// Entries, newest first.
    pub logs: Vec<DeliveryLogEntry>,
    /// Number of entries returned.
    pub count: usize,
}

/// Body of `DELETE /admin/webhooks/{id}/logs`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClearLogsResponse {
    /// Entries removed.
    pub deleted: u64,
}
