//! Webhook subscriptions, delivery log entries, and the wire payload.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{EventType, UserId};
use crate::error::GatewayError;

/// Attempt budget used when a subscription stores `0`.
pub const DEFAULT_RETRY_COUNT: u32 = 3;
/// Per-attempt timeout used when a subscription stores `0`.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Largest attempt budget an administrator may configure.
pub const MAX_RETRY_COUNT: u32 = 10;
/// Largest per-attempt timeout an administrator may configure.
pub const MAX_TIMEOUT_SECS: u64 = 300;
/// Response bodies are truncated to this many characters before logging.
pub const MAX_LOGGED_BODY_CHARS: usize = 4096;
/// Event tag used by synchronous test deliveries.
pub const TEST_EVENT: &str = "test";

/// Unique identifier for a webhook subscription.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Generates a new random subscription ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered external receiver of business events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WebhookSubscription {
    /// Subscription ID.
    pub id: SubscriptionId,
    /// Display name.
    pub name: String,
    /// Target URL (`http` or `https`).
    pub url: String,
    /// HMAC signing secret. Deliveries are unsigned when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Events this subscription receives.
    pub events: Vec<EventType>,
    /// Inactive subscriptions receive nothing.
    pub is_active: bool,
    /// Total attempt budget per dispatch (`0` means the default).
    pub retry_count: u32,
    /// Per-attempt timeout in seconds (`0` means the default).
    pub timeout_seconds: u64,
    /// Extra request headers sent with every delivery.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Administrator who created the subscription.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl WebhookSubscription {
    /// Builds a fresh subscription from a validated request.
    #[must_use]
    pub fn from_new(new: NewSubscription, created_by: Option<UserId>) -> Self {
        let now = Utc::now();
        Self {
            id: SubscriptionId::new(),
            name: new.name,
            url: new.url,
            secret: new.secret,
            events: new.events,
            is_active: new.is_active,
            retry_count: new.retry_count,
            timeout_seconds: new.timeout_seconds,
            headers: new.headers,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` when this subscription should receive `event`.
    #[must_use]
    pub fn wants(&self, event: EventType) -> bool {
        self.is_active && self.events.contains(&event)
    }

    /// Attempt budget with the zero-means-default rule applied.
    #[must_use]
    pub const fn effective_retry_count(&self) -> u32 {
        if self.retry_count == 0 {
            DEFAULT_RETRY_COUNT
        } else {
            self.retry_count
        }
    }

    /// Per-attempt timeout with the zero-means-default rule applied.
    #[must_use]
    pub const fn effective_timeout(&self) -> Duration {
        if self.timeout_seconds == 0 {
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        } else {
            Duration::from_secs(self.timeout_seconds)
        }
    }

    /// Applies an administrator update. The secret is kept when omitted.
    pub fn apply(&mut self, update: NewSubscription) {
        self.name = update.name;
        self.url = update.url;
        if update.secret.is_some() {
            self.secret = update.secret;
        }
        self.events = update.events;
        self.is_active = update.is_active;
        self.retry_count = update.retry_count;
        self.timeout_seconds = update.timeout_seconds;
        self.headers = update.headers;
        self.updated_at = Utc::now();
    }

    /// Copy safe to return from admin endpoints: the secret is masked.
    #[must_use]
    pub fn masked(&self) -> Self {
        Self {
            secret: self.secret.as_deref().map(mask_secret),
            ..self.clone()
        }
    }
}

/// Masks all but the last four characters of a secret.
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("****{tail}")
}

/// Validated input for creating or replacing a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscription {
    /// Display name.
    pub name: String,
    /// Target URL.
    pub url: String,
    /// Signing secret.
    pub secret: Option<String>,
    /// Subscribed events.
    pub events: Vec<EventType>,
    /// Active flag.
    pub is_active: bool,
    /// Attempt budget.
    pub retry_count: u32,
    /// Per-attempt timeout in seconds.
    pub timeout_seconds: u64,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
}

impl NewSubscription {
    /// Checks administrator input and applies defaults.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for an empty name, a URL
    /// that is not `http`/`https`, an empty event set, or out-of-range
    /// retry or timeout values.
    pub fn validated(mut self) -> Result<Self, GatewayError> {
        self.name = self.name.trim().to_string();
        self.url = self.url.trim().to_string();
        if self.name.is_empty() {
            return Err(GatewayError::InvalidRequest("name is required".into()));
        }
        validate_url(&self.url)?;
        if self.events.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "at least one event is required".into(),
            ));
        }
        let mut seen = Vec::with_capacity(self.events.len());
        self.events.retain(|event| {
            let first = !seen.contains(event);
            seen.push(*event);
            first
        });
        if self.retry_count == 0 {
            self.retry_count = DEFAULT_RETRY_COUNT;
        }
        if self.retry_count > MAX_RETRY_COUNT {
            return Err(GatewayError::InvalidRequest(format!(
                "retry_count must be at most {MAX_RETRY_COUNT}"
            )));
        }
        if self.timeout_seconds == 0 {
            self.timeout_seconds = DEFAULT_TIMEOUT_SECS;
        }
        if self.timeout_seconds > MAX_TIMEOUT_SECS {
            return Err(GatewayError::InvalidRequest(format!(
                "timeout_seconds must be at most {MAX_TIMEOUT_SECS}"
            )));
        }
        if self.secret.as_deref().is_some_and(|s| s.trim().is_empty()) {
            self.secret = None;
        }
        Ok(self)
    }
}

fn validate_url(url: &str) -> Result<(), GatewayError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid url: {e}")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(()),
        _ => Err(GatewayError::InvalidRequest(
            "url must start with http:// or https://".into(),
        )),
    }
}

/// Subscription plus delivery statistics, as listed to administrators.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubscriptionSummary {
    /// Subscription with masked secret.
    #[serde(flatten)]
    pub subscription: WebhookSubscription,
    /// Number of logged attempts.
    pub log_count: u64,
    /// Number of logged attempts that did not end in a 2xx.
    pub error_count: u64,
}

/// Body POSTed to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookPayload {
    /// Event tag.
    pub event: String,
    /// Dispatch time (RFC 3339).
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub data: serde_json::Value,
}

/// One delivery attempt to be appended to the log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDeliveryLog {
    /// Subscription the attempt was made for.
    pub subscription_id: SubscriptionId,
    /// Event tag.
    pub event_type: String,
    /// Snapshot of the event payload.
    pub payload: serde_json::Value,
    /// HTTP status, when a response arrived.
    pub response_status: Option<u16>,
    /// Truncated response body, when a response arrived.
    pub response_body: Option<String>,
    /// Transport or status error, when the attempt did not succeed.
    pub error_message: Option<String>,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Wall-clock duration of the attempt.
    pub duration_ms: u64,
}

/// Persisted delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeliveryLogEntry {
    /// Log entry ID.
    pub id: i64,
    /// Subscription the attempt was made for.
    pub subscription_id: SubscriptionId,
    /// Event tag.
    pub event_type: String,
    /// Snapshot of the event payload.
    pub payload: serde_json::Value,
    /// HTTP status, when a response arrived.
    pub response_status: Option<u16>,
    /// Truncated response body.
    pub response_body: Option<String>,
    /// Error text.
    pub error_message: Option<String>,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Attempt duration in milliseconds.
    pub duration_ms: u64,
    /// When the attempt was logged.
    pub created_at: DateTime<Utc>,
}

impl DeliveryLogEntry {
    /// Returns `true` when the attempt got a 2xx response.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.response_status.is_some_and(|s| (200..300).contains(&s))
    }
}

/// Outcome of a synchronous test delivery.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TestDeliveryResult {
    /// Whether the receiver answered with a 2xx.
    pub success: bool,
    /// HTTP status, when a response arrived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Truncated response body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    /// Attempt duration in milliseconds.
    pub duration_ms: u64,
    /// Transport or status error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Truncates `body` to [`MAX_LOGGED_BODY_CHARS`] characters.
#[must_use]
pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_LOGGED_BODY_CHARS) {
        Some((cut, _)) => body.get(..cut).unwrap_or(body).to_string(),
        None => body.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn new_sub() -> NewSubscription {
        NewSubscription {
            name: "crm".into(),
            url: "https://hooks.example.com/in".into(),
            secret: Some("s3cr3t-value".into()),
            events: vec![EventType::PortfolioApproved],
            is_active: true,
            retry_count: 0,
            timeout_seconds: 0,
            headers: BTreeMap::new(),
        }
    }

    #[test]
    fn validation_applies_defaults() {
        let Ok(sub) = new_sub().validated() else {
            panic!("valid input rejected");
        };
        assert_eq!(sub.retry_count, DEFAULT_RETRY_COUNT);
        assert_eq!(sub.timeout_seconds, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn rejects_non_http_urls() {
        for url in ["ftp://x.example.com", "not a url", "hooks.example.com/in"] {
            let input = NewSubscription {
                url: url.into(),
                ..new_sub()
            };
            assert!(input.validated().is_err(), "{url} should be rejected");
        }
    }

    #[test]
    fn rejects_empty_event_set() {
        let input = NewSubscription {
            events: vec![],
            ..new_sub()
        };
        assert!(input.validated().is_err());
    }

    #[test]
    fn rejects_oversized_retry_budget() {
        let input = NewSubscription {
            retry_count: MAX_RETRY_COUNT + 1,
            ..new_sub()
        };
        assert!(input.validated().is_err());
    }

    #[test]
    fn zero_values_mean_defaults_at_delivery_time() {
        let mut sub = WebhookSubscription::from_new(new_sub(), None);
        sub.retry_count = 0;
        sub.timeout_seconds = 0;
        assert_eq!(sub.effective_retry_count(), 3);
        assert_eq!(sub.effective_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn empty_event_set_never_matches() {
        let mut sub = WebhookSubscription::from_new(new_sub(), None);
        sub.events.clear();
        for event in EventType::ALL {
            assert!(!sub.wants(event));
        }
    }

    #[test]
    fn inactive_never_matches() {
        let mut sub = WebhookSubscription::from_new(new_sub(), None);
        assert!(sub.wants(EventType::PortfolioApproved));
        sub.is_active = false;
        assert!(!sub.wants(EventType::PortfolioApproved));
    }

    #[test]
    fn update_keeps_secret_when_omitted() {
        let mut sub = WebhookSubscription::from_new(new_sub(), None);
        sub.apply(NewSubscription {
            secret: None,
            name: "renamed".into(),
            ..new_sub()
        });
        assert_eq!(sub.name, "renamed");
        assert_eq!(sub.secret.as_deref(), Some("s3cr3t-value"));
    }

    #[test]
    fn masking_keeps_last_four() {
        assert_eq!(mask_secret("s3cr3t-value"), "****alue");
        assert_eq!(mask_secret("abc"), "****");
        let sub = WebhookSubscription::from_new(new_sub(), None).masked();
        assert_eq!(sub.secret.as_deref(), Some("****alue"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "é".repeat(MAX_LOGGED_BODY_CHARS + 10);
        let cut = truncate_body(&long);
        assert_eq!(cut.chars().count(), MAX_LOGGED_BODY_CHARS);
        assert_eq!(truncate_body("short"), "short");
    }
}
