//! In-process [`WebhookStore`] used by tests and when persistence is off.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{LogCounts, WebhookStore};
use crate::domain::EventType;
use crate::error::GatewayError;
use crate::webhook::model::{
    DeliveryLogEntry, NewDeliveryLog, NewSubscription, SubscriptionId, WebhookSubscription,
};

/// Volatile store; everything is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryWebhookStore {
    subscriptions: RwLock<HashMap<SubscriptionId, WebhookSubscription>>,
    logs: RwLock<Vec<DeliveryLogEntry>>,
    next_log_id: AtomicI64,
}

impl InMemoryWebhookStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn create(
        &self,
        subscription: WebhookSubscription,
    ) -> Result<WebhookSubscription, GatewayError> {
        let mut map = self.subscriptions.write().await;
        map.insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    async fn list(&self) -> Result<Vec<WebhookSubscription>, GatewayError> {
        let map = self.subscriptions.read().await;
        let mut all: Vec<_> = map.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn get(&self, id: SubscriptionId) -> Result<WebhookSubscription, GatewayError> {
        let map = self.subscriptions.read().await;
        map.get(&id)
            .cloned()
            .ok_or_else(|| GatewayError::SubscriptionNotFound(id.as_uuid()))
    }

    async fn update(
        &self,
        id: SubscriptionId,
        update: NewSubscription,
    ) -> Result<WebhookSubscription, GatewayError> {
        let mut map = self.subscriptions.write().await;
        let sub = map
            .get_mut(&id)
            .ok_or_else(|| GatewayError::SubscriptionNotFound(id.as_uuid()))?;
        sub.apply(update);
        Ok(sub.clone())
    }

    async fn toggle(&self, id: SubscriptionId) -> Result<WebhookSubscription, GatewayError> {
        let mut map = self.subscriptions.write().await;
        let sub = map
            .get_mut(&id)
            .ok_or_else(|| GatewayError::SubscriptionNotFound(id.as_uuid()))?;
        sub.is_active = !sub.is_active;
        sub.updated_at = Utc::now();
        Ok(sub.clone())
    }

    async fn delete(&self, id: SubscriptionId) -> Result<(), GatewayError> {
        let mut map = self.subscriptions.write().await;
        map.remove(&id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::SubscriptionNotFound(id.as_uuid()))
    }

    async fn active_for_event(
        &self,
        event: EventType,
    ) -> Result<Vec<WebhookSubscription>, GatewayError> {
        let map = self.subscriptions.read().await;
        Ok(map.values().filter(|s| s.wants(event)).cloned().collect())
    }

    async fn append_log(&self, entry: NewDeliveryLog) -> Result<DeliveryLogEntry, GatewayError> {
        let stored = DeliveryLogEntry {
            id: self.next_log_id.fetch_add(1, Ordering::Relaxed) + 1,
            subscription_id: entry.subscription_id,
            event_type: entry.event_type,
            payload: entry.payload,
            response_status: entry.response_status,
            response_body: entry.response_body,
            error_message: entry.error_message,
            attempt: entry.attempt,
            duration_ms: entry.duration_ms,
            created_at: Utc::now(),
        };
        self.logs.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn logs(
        &self,
        id: SubscriptionId,
        limit: usize,
    ) -> Result<Vec<DeliveryLogEntry>, GatewayError> {
        let logs = self.logs.read().await;
        Ok(logs
            .iter()
            .rev()
            .filter(|e| e.subscription_id == id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn clear_logs(&self, id: SubscriptionId) -> Result<u64, GatewayError> {
        let mut logs = self.logs.write().await;
        let before = logs.len();
        logs.retain(|e| e.subscription_id != id);
        Ok(u64::try_from(before - logs.len()).unwrap_or(u64::MAX))
    }

    async fn log_counts(&self, id: SubscriptionId) -> Result<LogCounts, GatewayError> {
        let logs = self.logs.read().await;
        Ok(logs
            .iter()
            .filter(|e| e.subscription_id == id)
            .fold(LogCounts::default(), |mut acc, e| {
                acc.total += 1;
                if !e.is_success() {
                    acc.errors += 1;
                }
                acc
            }))
    }
}
