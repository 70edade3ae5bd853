//! Webhook administration: subscription CRUD, delivery logs, test sends.

use std::sync::Arc;

use crate::domain::UserId;
use crate::error::GatewayError;
use crate::persistence::WebhookStore;
use crate::webhook::WebhookDispatcher;
use crate::webhook::model::{
    DeliveryLogEntry, NewSubscription, SubscriptionId, SubscriptionSummary, TestDeliveryResult,
    WebhookSubscription,
};

/// Default page size for delivery logs.
pub const DEFAULT_LOG_LIMIT: usize = 50;
/// Largest page size for delivery logs.
pub const MAX_LOG_LIMIT: usize = 500;

/// Orchestrates subscription management on top of the store.
///
/// Every subscription leaving this service has its secret masked.
#[derive(Debug, Clone)]
pub struct WebhookService {
    store: Arc<dyn WebhookStore>,
    dispatcher: Arc<WebhookDispatcher>,
}

impl WebhookService {
    /// Creates a new `WebhookService`.
    #[must_use]
    pub fn new(store: Arc<dyn WebhookStore>, dispatcher: Arc<WebhookDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Lists subscriptions with their attempt totals.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    pub async fn list(&self) -> Result<Vec<SubscriptionSummary>, GatewayError> {
        let subscriptions = self.store.list().await?;
        let mut summaries = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            let counts = self.store.log_counts(subscription.id).await?;
            summaries.push(SubscriptionSummary {
                subscription: subscription.masked(),
                log_count: counts.total,
                error_count: counts.errors,
            });
        }
        Ok(summaries)
    }

    /// Validates and stores a new subscription.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for invalid input.
    pub async fn create(
        &self,
        input: NewSubscription,
        created_by: UserId,
    ) -> Result<WebhookSubscription, GatewayError> {
        let input = input.validated()?;
        let created = self
            .store
            .create(WebhookSubscription::from_new(input, Some(created_by)))
            .await?;
        tracing::info!(subscription_id = %created.id, url = %created.url, "webhook created");
        Ok(created.masked())
    }

    /// Fetches one subscription.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SubscriptionNotFound`] for unknown IDs.
    pub async fn get(&self, id: SubscriptionId) -> Result<WebhookSubscription, GatewayError> {
        Ok(self.store.get(id).await?.masked())
    }

    /// Replaces a subscription's settings.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for invalid input and
    /// [`GatewayError::SubscriptionNotFound`] for unknown IDs.
    pub async fn update(
        &self,
        id: SubscriptionId,
        input: NewSubscription,
    ) -> Result<WebhookSubscription, GatewayError> {
        let input = input.validated()?;
        let updated = self.store.update(id, input).await?;
        tracing::info!(subscription_id = %id, "webhook updated");
        Ok(updated.masked())
    }

    /// Flips the active flag.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SubscriptionNotFound`] for unknown IDs.
    pub async fn toggle(&self, id: SubscriptionId) -> Result<WebhookSubscription, GatewayError> {
        let toggled = self.store.toggle(id).await?;
        tracing::info!(subscription_id = %id, is_active = toggled.is_active, "webhook toggled");
        Ok(toggled.masked())
    }

    /// Deletes a subscription. Deliveries already scheduled still finish.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SubscriptionNotFound`] for unknown IDs.
    pub async fn delete(&self, id: SubscriptionId) -> Result<(), GatewayError> {
        self.store.delete(id).await?;
        tracing::info!(subscription_id = %id, "webhook deleted");
        Ok(())
    }

    /// Sends one synchronous `test` delivery.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SubscriptionNotFound`] for unknown IDs.
    pub async fn test(&self, id: SubscriptionId) -> Result<TestDeliveryResult, GatewayError> {
        let subscription = self.store.get(id).await?;
        Ok(self.dispatcher.test_delivery(&subscription).await)
    }

    /// Recent delivery log entries, newest first.
    ///
    /// `limit` defaults to [`DEFAULT_LOG_LIMIT`] and is clamped to
    /// `1..=MAX_LOG_LIMIT`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SubscriptionNotFound`] for unknown IDs.
    pub async fn logs(
        &self,
        id: SubscriptionId,
        limit: Option<usize>,
    ) -> Result<Vec<DeliveryLogEntry>, GatewayError> {
        self.store.get(id).await?;
        let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
        self.store.logs(id, limit).await
    }

    /// Purges a subscription's delivery log.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SubscriptionNotFound`] for unknown IDs.
    pub async fn clear_logs(&self, id: SubscriptionId) -> Result<u64, GatewayError> {
        self.store.get(id).await?;
        let removed = self.store.clear_logs(id).await?;
        tracing::info!(subscription_id = %id, removed, "webhook logs cleared");
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::EventType;
    use crate::persistence::InMemoryWebhookStore;
    use crate::webhook::DispatcherConfig;
    use crate::webhook::model::NewDeliveryLog;

    fn input() -> NewSubscription {
        NewSubscription {
            name: "lms".into(),
            url: "https://lms.example.edu/hooks".into(),
            secret: Some("topsecret".into()),
            events: vec![EventType::PortfolioApproved, EventType::PortfolioRejected],
            is_active: true,
            retry_count: 0,
            timeout_seconds: 0,
            headers: BTreeMap::new(),
        }
    }

    fn service() -> (WebhookService, Arc<InMemoryWebhookStore>) {
        let store = Arc::new(InMemoryWebhookStore::new());
        let dyn_store: Arc<dyn WebhookStore> = Arc::clone(&store) as Arc<dyn WebhookStore>;
        let Ok(dispatcher) = WebhookDispatcher::new(Arc::clone(&dyn_store), DispatcherConfig::default())
        else {
            panic!("dispatcher");
        };
        (WebhookService::new(dyn_store, Arc::new(dispatcher)), store)
    }

    #[tokio::test]
    async fn created_subscription_is_masked_but_stored_in_full() {
        let (svc, store) = service();
        let Ok(created) = svc.create(input(), UserId::new("admin")).await else {
            panic!("create failed");
        };
        assert_eq!(created.secret.as_deref(), Some("****cret"));
        assert_eq!(created.retry_count, 3);
        let Ok(stored) = store.get(created.id).await else {
            panic!("not stored");
        };
        assert_eq!(stored.secret.as_deref(), Some("topsecret"));
        assert_eq!(stored.created_by, Some(UserId::new("admin")));
    }

    #[tokio::test]
    async fn list_includes_counts() {
        let (svc, store) = service();
        let Ok(created) = svc.create(input(), UserId::new("admin")).await else {
            panic!("create failed");
        };
        for (attempt, status) in [(1, Some(500)), (2, Some(200))] {
            let _ = store
                .append_log(NewDeliveryLog {
                    subscription_id: created.id,
                    event_type: "portfolio.approved".into(),
                    payload: serde_json::json!({}),
                    response_status: status,
                    response_body: None,
                    error_message: None,
                    attempt,
                    duration_ms: 3,
                })
                .await;
        }
        let Ok(list) = svc.list().await else {
            panic!("list failed");
        };
        let Some(summary) = list.first() else {
            panic!("empty list");
        };
        assert_eq!(summary.log_count, 2);
        assert_eq!(summary.error_count, 1);
    }

    #[tokio::test]
    async fn logs_for_unknown_subscription_is_not_found() {
        let (svc, _) = service();
        assert!(matches!(
            svc.logs(SubscriptionId::new(), None).await,
            Err(GatewayError::SubscriptionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_storage() {
        let (svc, store) = service();
        let bad = NewSubscription {
            url: "ftp://nope".into(),
            ..input()
        };
        assert!(matches!(
            svc.create(bad, UserId::new("admin")).await,
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(store.list().await.unwrap_or_default().is_empty());
    }
}
