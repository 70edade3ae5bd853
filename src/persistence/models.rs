//! Row shapes for the `webhooks` and `webhook_logs` tables.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{EventType, UserId};
use crate::webhook::model::{DeliveryLogEntry, SubscriptionId, WebhookSubscription};

/// Column list matching [`SubscriptionRow`].
pub const SUBSCRIPTION_COLUMNS: &str = "id, name, url, secret, events, is_active, retry_count, \
     timeout_seconds, headers, created_by, created_at, updated_at";

/// Column list matching [`LogRow`].
pub const LOG_COLUMNS: &str = "id, webhook_id, event_type, payload, response_status, \
     response_body, error_message, attempt, duration_ms, created_at";

/// A row from the `webhooks` table.
pub type SubscriptionRow = (
    Uuid,
    String,
    String,
    Option<String>,
    Vec<String>,
    bool,
    i32,
    i32,
    serde_json::Value,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

/// A row from the `webhook_logs` table.
pub type LogRow = (
    i64,
    Uuid,
    String,
    serde_json::Value,
    Option<i32>,
    Option<String>,
    Option<String>,
    i32,
    i64,
    DateTime<Utc>,
);

/// Converts a `webhooks` row. Unknown event tags are skipped.
#[must_use]
pub fn subscription_from_row(row: SubscriptionRow) -> WebhookSubscription {
    let (
        id,
        name,
        url,
        secret,
        events,
        is_active,
        retry_count,
        timeout_seconds,
        headers,
        created_by,
        created_at,
        updated_at,
    ) = row;

    let events = events
        .iter()
        .filter_map(|tag| match tag.parse::<EventType>() {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(subscription_id = %id, error = %e, "skipping stored event tag");
                None
            }
        })
        .collect();
    let headers: BTreeMap<String, String> = serde_json::from_value(headers).unwrap_or_default();

    WebhookSubscription {
        id: SubscriptionId::from_uuid(id),
        name,
        url,
        secret,
        events,
        is_active,
        retry_count: u32::try_from(retry_count).unwrap_or(0),
        timeout_seconds: u64::try_from(timeout_seconds).unwrap_or(0),
        headers,
        created_by: created_by.map(UserId::new),
        created_at,
        updated_at,
    }
}

/// Converts a `webhook_logs` row.
#[must_use]
pub fn log_from_row(row: LogRow) -> DeliveryLogEntry {
    let (
        id,
        webhook_id,
        event_type,
        payload,
        response_status,
        response_body,
        error_message,
        attempt,
        duration_ms,
        created_at,
    ) = row;

    DeliveryLogEntry {
        id,
        subscription_id: SubscriptionId::from_uuid(webhook_id),
        event_type,
        payload,
        response_status: response_status.and_then(|s| u16::try_from(s).ok()),
        response_body,
        error_message,
        attempt: u32::try_from(attempt).unwrap_or(0),
        duration_ms: u64::try_from(duration_ms).unwrap_or(0),
        created_at,
    }
}

/// Event tags as stored in the `events TEXT[]` column.
#[must_use]
pub fn event_tags(events: &[EventType]) -> Vec<String> {
    events.iter().map(|e| e.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_row_skips_unknown_tags() {
        let now = Utc::now();
        let row: SubscriptionRow = (
            Uuid::new_v4(),
            "n".into(),
            "https://x.example.com".into(),
            None,
            vec!["user.created".into(), "legacy.tag".into()],
            true,
            0,
            15,
            serde_json::json!({"X-Team": "ops"}),
            Some("admin-1".into()),
            now,
            now,
        );
        let sub = subscription_from_row(row);
        assert_eq!(sub.events, vec![EventType::UserCreated]);
        assert_eq!(sub.effective_retry_count(), 3);
        assert_eq!(sub.headers.get("X-Team").map(String::as_str), Some("ops"));
        assert_eq!(sub.created_by, Some(UserId::new("admin-1")));
    }

    #[test]
    fn log_row_maps_optional_status() {
        let row: LogRow = (
            7,
            Uuid::new_v4(),
            "auth.login".into(),
            serde_json::json!({}),
            None,
            None,
            Some("connection refused".into()),
            2,
            120,
            Utc::now(),
        );
        let entry = log_from_row(row);
        assert_eq!(entry.attempt, 2);
        assert!(!entry.is_success());
        assert_eq!(entry.duration_ms, 120);
    }
}
