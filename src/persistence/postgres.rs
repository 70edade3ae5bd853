//! PostgreSQL implementation of [`WebhookStore`].

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use super::models::{
    LOG_COLUMNS, LogRow, SUBSCRIPTION_COLUMNS, SubscriptionRow, event_tags, log_from_row,
    subscription_from_row,
};
use super::{LogCounts, WebhookStore};
use crate::domain::EventType;
use crate::error::GatewayError;
use crate::webhook::model::{
    DeliveryLogEntry, NewDeliveryLog, NewSubscription, SubscriptionId, WebhookSubscription,
};

/// PostgreSQL-backed webhook store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresWebhookStore {
    pool: PgPool,
}

impl PostgresWebhookStore {
    /// Creates a store over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies pending schema migrations from `migrations/`.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), GatewayError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| GatewayError::PersistenceError(e.to_string()))
    }

    async fn fetch(&self, id: SubscriptionId) -> Result<WebhookSubscription, GatewayError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM webhooks WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(subscription_from_row)
            .ok_or_else(|| GatewayError::SubscriptionNotFound(id.as_uuid()))
    }
}

fn to_i32<T: TryInto<i32>>(value: T) -> i32 {
    value.try_into().unwrap_or(i32::MAX)
}

#[async_trait]
impl WebhookStore for PostgresWebhookStore {
    async fn create(
        &self,
        subscription: WebhookSubscription,
    ) -> Result<WebhookSubscription, GatewayError> {
        let headers = serde_json::to_value(&subscription.headers).unwrap_or_default();
        sqlx::query(
            "INSERT INTO webhooks (id, name, url, secret, events, is_active, retry_count, \
             timeout_seconds, headers, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(subscription.id.as_uuid())
        .bind(&subscription.name)
        .bind(&subscription.url)
        .bind(&subscription.secret)
        .bind(event_tags(&subscription.events))
        .bind(subscription.is_active)
        .bind(to_i32(subscription.retry_count))
        .bind(to_i32(subscription.timeout_seconds))
        .bind(headers)
        .bind(subscription.created_by.as_ref().map(|u| u.as_str().to_string()))
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(subscription)
    }

    async fn list(&self) -> Result<Vec<WebhookSubscription>, GatewayError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM webhooks ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(subscription_from_row).collect())
    }

    async fn get(&self, id: SubscriptionId) -> Result<WebhookSubscription, GatewayError> {
        self.fetch(id).await
    }

    async fn update(
        &self,
        id: SubscriptionId,
        update: NewSubscription,
    ) -> Result<WebhookSubscription, GatewayError> {
        let mut subscription = self.fetch(id).await?;
        subscription.apply(update);
        let headers = serde_json::to_value(&subscription.headers).unwrap_or_default();

        let result = sqlx::query(
            "UPDATE webhooks SET name = $2, url = $3, secret = $4, events = $5, is_active = $6, \
             retry_count = $7, timeout_seconds = $8, headers = $9, updated_at = $10 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(&subscription.name)
        .bind(&subscription.url)
        .bind(&subscription.secret)
        .bind(event_tags(&subscription.events))
        .bind(subscription.is_active)
        .bind(to_i32(subscription.retry_count))
        .bind(to_i32(subscription.timeout_seconds))
        .bind(headers)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::SubscriptionNotFound(id.as_uuid()));
        }
        Ok(subscription)
    }

    async fn toggle(&self, id: SubscriptionId) -> Result<WebhookSubscription, GatewayError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "UPDATE webhooks SET is_active = NOT is_active, updated_at = $2 WHERE id = $1 \
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(subscription_from_row)
            .ok_or_else(|| GatewayError::SubscriptionNotFound(id.as_uuid()))
    }

    async fn delete(&self, id: SubscriptionId) -> Result<(), GatewayError> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::SubscriptionNotFound(id.as_uuid()));
        }
        Ok(())
    }

    async fn active_for_event(
        &self,
        event: EventType,
    ) -> Result<Vec<WebhookSubscription>, GatewayError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM webhooks WHERE is_active AND $1 = ANY(events)"
        ))
        .bind(event.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(subscription_from_row).collect())
    }

    async fn append_log(&self, entry: NewDeliveryLog) -> Result<DeliveryLogEntry, GatewayError> {
        let row = sqlx::query_as::<_, LogRow>(&format!(
            "INSERT INTO webhook_logs (webhook_id, event_type, payload, response_status, \
             response_body, error_message, attempt, duration_ms) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {LOG_COLUMNS}"
        ))
        .bind(entry.subscription_id.as_uuid())
        .bind(&entry.event_type)
        .bind(&entry.payload)
        .bind(entry.response_status.map(i32::from))
        .bind(&entry.response_body)
        .bind(&entry.error_message)
        .bind(to_i32(entry.attempt))
        .bind(i64::try_from(entry.duration_ms).unwrap_or(i64::MAX))
        .fetch_one(&self.pool)
        .await?;

        Ok(log_from_row(row))
    }

    async fn logs(
        &self,
        id: SubscriptionId,
        limit: usize,
    ) -> Result<Vec<DeliveryLogEntry>, GatewayError> {
        let rows = sqlx::query_as::<_, LogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM webhook_logs WHERE webhook_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2"
        ))
        .bind(id.as_uuid())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(log_from_row).collect())
    }

    async fn clear_logs(&self, id: SubscriptionId) -> Result<u64, GatewayError> {
        let result = sqlx::query("DELETE FROM webhook_logs WHERE webhook_id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn log_counts(&self, id: SubscriptionId) -> Result<LogCounts, GatewayError> {
        let (total, errors) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), \
             COUNT(*) FILTER (WHERE response_status IS NULL OR response_status NOT BETWEEN 200 AND 299) \
             FROM webhook_logs WHERE webhook_id = $1",
        )
        .bind(id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(LogCounts {
            total: u64::try_from(total).unwrap_or(0),
            errors: u64::try_from(errors).unwrap_or(0),
        })
    }
}
