//! Persistence layer: webhook subscriptions and the delivery log.
//!
//! [`WebhookStore`] is the seam between the dispatcher / admin API and
//! storage. [`memory::InMemoryWebhookStore`] backs tests and deployments
//! with persistence disabled; [`postgres::PostgresWebhookStore`] uses
//! `sqlx::PgPool` against the tables created by `migrations/`.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;

use crate::domain::EventType;
use crate::error::GatewayError;
use crate::webhook::model::{
    DeliveryLogEntry, NewDeliveryLog, NewSubscription, SubscriptionId, WebhookSubscription,
};

pub use memory::InMemoryWebhookStore;
pub use postgres::PostgresWebhookStore;

/// Attempt totals for one subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogCounts {
    /// All logged attempts.
    pub total: u64,
    /// Attempts that did not end in a 2xx response.
    pub errors: u64,
}

/// Durable subscription registry and append-only delivery log.
///
/// Log entries are keyed by subscription ID but do not depend on the
/// subscription still existing, so in-flight deliveries can keep logging
/// after a delete.
#[async_trait]
pub trait WebhookStore: Send + Sync + std::fmt::Debug {
    /// Stores a new subscription.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn create(&self, subscription: WebhookSubscription)
    -> Result<WebhookSubscription, GatewayError>;

    /// Lists every subscription, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn list(&self) -> Result<Vec<WebhookSubscription>, GatewayError>;

    /// Fetches one subscription.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SubscriptionNotFound`] for unknown IDs.
    async fn get(&self, id: SubscriptionId) -> Result<WebhookSubscription, GatewayError>;

    /// Replaces a subscription's settings, keeping the secret when omitted.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SubscriptionNotFound`] for unknown IDs.
    async fn update(
        &self,
        id: SubscriptionId,
        update: NewSubscription,
    ) -> Result<WebhookSubscription, GatewayError>;

    /// Flips the active flag.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SubscriptionNotFound`] for unknown IDs.
    async fn toggle(&self, id: SubscriptionId) -> Result<WebhookSubscription, GatewayError>;

    /// Removes a subscription. Its log entries are kept.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SubscriptionNotFound`] for unknown IDs.
    async fn delete(&self, id: SubscriptionId) -> Result<(), GatewayError>;

    /// Active subscriptions whose event set contains `event`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn active_for_event(
        &self,
        event: EventType,
    ) -> Result<Vec<WebhookSubscription>, GatewayError>;

    /// Appends one attempt to the delivery log.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn append_log(&self, entry: NewDeliveryLog) -> Result<DeliveryLogEntry, GatewayError>;

    /// Most recent log entries for a subscription, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn logs(
        &self,
        id: SubscriptionId,
        limit: usize,
    ) -> Result<Vec<DeliveryLogEntry>, GatewayError>;

    /// Purges a subscription's log. Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn clear_logs(&self, id: SubscriptionId) -> Result<u64, GatewayError>;

    /// Attempt totals for a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn log_counts(&self, id: SubscriptionId) -> Result<LogCounts, GatewayError>;
}
