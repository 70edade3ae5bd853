//! Domain events and the envelope routed through the Hub and the Dispatcher.
//!
//! [`EventType`] is the closed vocabulary of business events that webhook
//! subscribers can listen for. [`Envelope`] is the transient routing unit:
//! a [`Topic`] tag, an optional target user, an opaque JSON payload, and a
//! timestamp.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::UserId;

/// Business events that can be relayed to webhook subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum EventType {
    /// A portfolio was submitted.
    #[serde(rename = "portfolio.created")]
    PortfolioCreated,
    /// A portfolio was edited.
    #[serde(rename = "portfolio.updated")]
    PortfolioUpdated,
    /// A portfolio was deleted.
    #[serde(rename = "portfolio.deleted")]
    PortfolioDeleted,
    /// A registrar approved a portfolio.
    #[serde(rename = "portfolio.approved")]
    PortfolioApproved,
    /// A registrar rejected a portfolio.
    #[serde(rename = "portfolio.rejected")]
    PortfolioRejected,
    /// A user account was created.
    #[serde(rename = "user.created")]
    UserCreated,
    /// A user account was updated.
    #[serde(rename = "user.updated")]
    UserUpdated,
    /// A user account was deleted.
    #[serde(rename = "user.deleted")]
    UserDeleted,
    /// A notification was pushed to a user.
    #[serde(rename = "notification.sent")]
    NotificationSent,
    /// A user logged in successfully.
    #[serde(rename = "auth.login")]
    LoginSuccess,
    /// A bulk import finished.
    #[serde(rename = "import.completed")]
    ImportCompleted,
}

impl EventType {
    /// Every subscribable event, in catalog order.
    pub const ALL: [Self; 11] = [
        Self::PortfolioCreated,
        Self::PortfolioUpdated,
        Self::PortfolioDeleted,
        Self::PortfolioApproved,
        Self::PortfolioRejected,
        Self::UserCreated,
        Self::UserUpdated,
        Self::UserDeleted,
        Self::NotificationSent,
        Self::LoginSuccess,
        Self::ImportCompleted,
    ];

    /// Returns the dotted wire tag (e.g. `"portfolio.approved"`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PortfolioCreated => "portfolio.created",
            Self::PortfolioUpdated => "portfolio.updated",
            Self::PortfolioDeleted => "portfolio.deleted",
            Self::PortfolioApproved => "portfolio.approved",
            Self::PortfolioRejected => "portfolio.rejected",
            Self::UserCreated => "user.created",
            Self::UserUpdated => "user.updated",
            Self::UserDeleted => "user.deleted",
            Self::NotificationSent => "notification.sent",
            Self::LoginSuccess => "auth.login",
            Self::ImportCompleted => "import.completed",
        }
    }

    /// Human-readable label shown in the admin event catalog.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::PortfolioCreated => "Portfolio created",
            Self::PortfolioUpdated => "Portfolio updated",
            Self::PortfolioDeleted => "Portfolio deleted",
            Self::PortfolioApproved => "Portfolio approved",
            Self::PortfolioRejected => "Portfolio rejected",
            Self::UserCreated => "User created",
            Self::UserUpdated => "User updated",
            Self::UserDeleted => "User deleted",
            Self::NotificationSent => "Notification sent",
            Self::LoginSuccess => "Login",
            Self::ImportCompleted => "Import completed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an event tag is not part of the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// What an [`Envelope`] is about.
///
/// Live-only kinds (`notification`, `announcement`) never reach webhook
/// subscribers; business events reach both consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    /// Personal notification for one user.
    Notification,
    /// System-wide announcement.
    Announcement,
    /// A business event from the closed vocabulary.
    Event(EventType),
}

impl Topic {
    /// Returns the frame `type` used on the WebSocket wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::Announcement => "announcement",
            Self::Event(event) => event.as_str(),
        }
    }

    /// Returns the webhook event this topic maps to, if any.
    #[must_use]
    pub const fn event_type(&self) -> Option<EventType> {
        match self {
            Self::Event(event) => Some(*event),
            Self::Notification | Self::Announcement => None,
        }
    }
}

impl Serialize for Topic {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Transient routing unit shared by the Hub and the Dispatcher.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    /// Frame / event tag.
    #[serde(rename = "type")]
    pub topic: Topic,
    /// Recipient; `None` means broadcast.
    #[serde(rename = "user_id", skip_serializing_if = "Option::is_none")]
    pub target: Option<UserId>,
    /// Opaque structured payload.
    pub data: serde_json::Value,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Creates an envelope stamped with the current time.
    #[must_use]
    pub fn new(topic: Topic, target: Option<UserId>, data: serde_json::Value) -> Self {
        Self {
            topic,
            target,
            data,
            timestamp: Utc::now(),
        }
    }

    /// Personal notification addressed to `user_id`.
    #[must_use]
    pub fn notification(user_id: UserId, data: serde_json::Value) -> Self {
        Self::new(Topic::Notification, Some(user_id), data)
    }

    /// Broadcast announcement.
    #[must_use]
    pub fn announcement(data: serde_json::Value) -> Self {
        Self::new(Topic::Announcement, None, data)
    }

    /// Business event, optionally targeted at one user.
    #[must_use]
    pub fn event(event: EventType, target: Option<UserId>, data: serde_json::Value) -> Self {
        Self::new(Topic::Event(event), target, data)
    }

    /// Serializes the envelope as a WebSocket frame.
    ///
    /// Serialization of a `Value` payload cannot fail in practice; an empty
    /// string is returned if it ever does.
    #[must_use]
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn event_tags_round_trip_through_from_str() {
        for event in EventType::ALL {
            assert_eq!(event.as_str().parse::<EventType>().ok(), Some(event));
        }
        assert!("portfolio.exploded".parse::<EventType>().is_err());
    }

    #[test]
    fn serde_uses_dotted_tags() {
        let json = serde_json::to_string(&EventType::PortfolioApproved).unwrap_or_default();
        assert_eq!(json, "\"portfolio.approved\"");
        let parsed: Result<EventType, _> = serde_json::from_str("\"auth.login\"");
        assert_eq!(parsed.ok(), Some(EventType::LoginSuccess));
    }

    #[test]
    fn topic_maps_to_webhook_event() {
        assert_eq!(Topic::Notification.event_type(), None);
        assert_eq!(
            Topic::Event(EventType::UserCreated).event_type(),
            Some(EventType::UserCreated)
        );
    }

    #[test]
    fn frame_has_wire_shape() {
        let env = Envelope::notification(UserId::new("u1"), serde_json::json!({"title": "hi"}));
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&env.to_frame()) else {
            panic!("frame is not JSON");
        };
        assert_eq!(value["type"], "notification");
        assert_eq!(value["user_id"], "u1");
        assert_eq!(value["data"]["title"], "hi");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn broadcast_frame_omits_user_id() {
        let env = Envelope::announcement(serde_json::json!({}));
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&env.to_frame()) else {
            panic!("frame is not JSON");
        };
        assert!(value.get("user_id").is_none());
        assert_eq!(value["type"], "announcement");
    }
}
