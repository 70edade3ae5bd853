//! Request and response bodies for notification and presence endpoints.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Role, UserId};
use crate::ws::HubStats;

/// Body of `POST /admin/notifications`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NotificationRequest {
    /// Recipient.
    pub user_id: UserId,
    /// Notification kind shown by the client (e.g. `"approval"`).
    #[serde(default)]
    pub kind: Option<String>,
    /// Title.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Optional deep link.
    #[serde(default)]
    pub link: Option<String>,
    /// Optional structured metadata.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl NotificationRequest {
    /// Frame payload sent to the recipient.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        let mut data = serde_json::json!({
            "type": self.kind.as_deref().unwrap_or("info"),
            "title": self.title,
            "message": self.message,
            "created_at": Utc::now(),
        });
        if let Some(obj) = data.as_object_mut() {
            if let Some(link) = &self.link {
                obj.insert("link".into(), link.clone().into());
            }
            if let Some(metadata) = &self.metadata {
                obj.insert("metadata".into(), metadata.clone());
            }
        }
        data
    }
}

/// Body of `POST /admin/announcements`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AnnouncementRequest {
    /// Title.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Restrict to one role; everyone when absent.
    #[serde(default)]
    pub role: Option<Role>,
}

/// Result of a live push.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PushResponse {
    /// Connections the frame was enqueued on.
    pub delivered: usize,
    /// Whether a webhook fan-out was queued.
    pub webhook_queued: bool,
}

/// Body of `GET /admin/ws/online`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OnlineResponse {
    /// Connected identities.
    pub users: Vec<UserId>,
    /// Hub counters.
    pub stats: HubStats,
}
