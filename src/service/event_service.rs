//! Event service: the single entry point business code uses to announce
//! that something happened.
//!
//! One call fans out to both consumers: the [`Hub`] for connected users and
//! the [`WebhookDispatcher`] for external subscribers. Neither consumer can
//! fail the caller; live delivery is best-effort and webhook delivery is
//! queued.

use std::sync::Arc;

use crate::domain::{Envelope, EventType, Role, UserId};
use crate::webhook::WebhookDispatcher;
use crate::ws::{Hub, RouteOutcome};

/// What a publish call reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishReport {
    /// Connections the frame was enqueued on.
    pub live_recipients: usize,
    /// Whether a webhook fan-out was queued.
    pub webhook_queued: bool,
}

/// Fan-out facade over the Hub and the Dispatcher.
#[derive(Debug, Clone)]
pub struct EventService {
    hub: Arc<Hub>,
    dispatcher: Arc<WebhookDispatcher>,
}

impl EventService {
    /// Creates a new `EventService`.
    #[must_use]
    pub fn new(hub: Arc<Hub>, dispatcher: Arc<WebhookDispatcher>) -> Self {
        Self { hub, dispatcher }
    }

    /// Returns a reference to the inner [`Hub`].
    #[must_use]
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Routes `envelope` to live clients (its target, or everyone) and,
    /// for business events, queues a webhook fan-out.
    pub async fn publish(&self, envelope: Envelope) -> PublishReport {
        let live_recipients = match &envelope.target {
            Some(user_id) => {
                usize::from(self.hub.route_to_identity(user_id, &envelope).await == RouteOutcome::Delivered)
            }
            None => self.hub.broadcast(&envelope).await,
        };
        let webhook_queued = envelope
            .topic
            .event_type()
            .is_some_and(|event| self.trigger(event, envelope.data.clone()));
        PublishReport {
            live_recipients,
            webhook_queued,
        }
    }

    /// Pushes a business event to every live client with `role` and queues
    /// the webhook fan-out.
    pub async fn publish_to_role(
        &self,
        role: Role,
        event: EventType,
        data: serde_json::Value,
    ) -> PublishReport {
        let envelope = Envelope::event(event, None, data);
        let live_recipients = self.hub.route_by_role(role, &envelope).await;
        PublishReport {
            live_recipients,
            webhook_queued: self.trigger(event, envelope.data),
        }
    }

    /// Sends a personal notification and raises `notification.sent`.
    pub async fn notify_user(&self, user_id: UserId, data: serde_json::Value) -> PublishReport {
        let envelope = Envelope::notification(user_id.clone(), data);
        let outcome = self.hub.route_to_identity(&user_id, &envelope).await;
        let webhook_data = serde_json::json!({
            "user_id": user_id,
            "notification": envelope.data,
        });
        PublishReport {
            live_recipients: usize::from(outcome == RouteOutcome::Delivered),
            webhook_queued: self.trigger(EventType::NotificationSent, webhook_data),
        }
    }

    /// Broadcasts an announcement to everyone, or only to `role`.
    /// Announcements are live-only.
    pub async fn announce(&self, role: Option<Role>, data: serde_json::Value) -> usize {
        let envelope = Envelope::announcement(data);
        match role {
            Some(role) => self.hub.route_by_role(role, &envelope).await,
            None => self.hub.broadcast(&envelope).await,
        }
    }

    fn trigger(&self, event: EventType, data: serde_json::Value) -> bool {
        match self.dispatcher.trigger(event, data) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(event = %event, error = %e, "webhook trigger not queued");
                false
            }
        }
    }
}
