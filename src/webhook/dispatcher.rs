//! Fire-and-forget webhook fan-out with bounded retries.
//!
//! [`WebhookDispatcher::trigger`] pushes a fan-out job onto a bounded queue
//! and returns. A single worker drains the queue, resolves the interested
//! subscriptions, and spawns one delivery task per subscription. Each
//! delivery task runs its attempts strictly in order and appends one
//! delivery-log entry per attempt. A semaphore caps the HTTP attempts in
//! flight; a task holds a permit only while its request is running, never
//! while it sleeps between attempts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};

use super::model::{
    NewDeliveryLog, TEST_EVENT, TestDeliveryResult, WebhookPayload, WebhookSubscription,
    MAX_LOGGED_BODY_CHARS, truncate_body,
};
use super::signing::{DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER, signature_header_value};
use crate::domain::EventType;
use crate::error::GatewayError;
use crate::persistence::WebhookStore;

/// Why a trigger could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The work queue is full.
    #[error("webhook queue is full")]
    Backpressure,
    /// The dispatcher has been shut down.
    #[error("webhook dispatcher is shut down")]
    Shutdown,
}

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Fan-out jobs that may wait in the queue.
    pub queue_capacity: usize,
    /// HTTP attempts that may run at once.
    pub max_in_flight: usize,
    /// `User-Agent` sent with every delivery.
    pub user_agent: String,
    /// Backoff after attempt `n` is `backoff_unit * n²`.
    pub backoff_unit: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_in_flight: 64,
            user_agent: "relay-gateway-webhook/1.0".to_string(),
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl DispatcherConfig {
    /// Overrides the backoff unit (tests use milliseconds).
    #[must_use]
    pub const fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 2xx response.
    Delivered,
    /// Network error, timeout, 5xx or 429; worth another attempt.
    Retryable,
    /// Any other status; the receiver refused the payload.
    Rejected,
}

impl AttemptOutcome {
    /// Classifies an HTTP status.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Delivered,
            429 | 500..=599 => Self::Retryable,
            _ => Self::Rejected,
        }
    }
}

/// Summary of all attempts for one (event, subscription) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Number of attempts made.
    pub attempts: u32,
    /// Outcome of the final attempt.
    pub outcome: AttemptOutcome,
    /// Status of the final attempt, when a response arrived.
    pub last_status: Option<u16>,
    /// Remaining attempts were abandoned because the subscription was
    /// deleted mid-delivery.
    pub abandoned: bool,
}

#[derive(Debug)]
struct Job {
    event: EventType,
    data: serde_json::Value,
}

/// Result of a single HTTP attempt.
#[derive(Debug)]
struct AttemptResult {
    outcome: AttemptOutcome,
    status: Option<u16>,
    body: Option<String>,
    error: Option<String>,
    duration_ms: u64,
}

/// Shared state of the worker and every delivery task.
#[derive(Debug)]
struct DeliveryEngine {
    store: Arc<dyn WebhookStore>,
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    backoff_unit: Duration,
}

/// Relays business events to external HTTP subscribers.
#[derive(Debug)]
pub struct WebhookDispatcher {
    engine: Arc<DeliveryEngine>,
    queue: parking_lot::RwLock<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    max_in_flight: usize,
}

impl WebhookDispatcher {
    /// Creates the dispatcher and spawns its worker on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if the HTTP client cannot be built.
    pub fn new(store: Arc<dyn WebhookStore>, config: DispatcherConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {e}")))?;

        let max_in_flight = config.max_in_flight.max(1);
        let engine = Arc::new(DeliveryEngine {
            store,
            client,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            backoff_unit: config.backoff_unit,
        });

        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let worker = tokio::spawn(run_worker(Arc::clone(&engine), rx));

        Ok(Self {
            engine,
            queue: parking_lot::RwLock::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            max_in_flight,
        })
    }

    /// Queues a fan-out of `event` to every interested subscription.
    ///
    /// Never waits: the job is either queued or rejected immediately.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Backpressure`] when the queue is full and
    /// [`DispatchError::Shutdown`] after [`Self::shutdown`].
    pub fn trigger(&self, event: EventType, data: serde_json::Value) -> Result<(), DispatchError> {
        let guard = self.queue.read();
        let Some(tx) = guard.as_ref() else {
            return Err(DispatchError::Shutdown);
        };
        match tx.try_send(Job { event, data }) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(event = %job.event, "webhook queue full, trigger dropped");
                Err(DispatchError::Backpressure)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DispatchError::Shutdown),
        }
    }

    /// Delivers `data` to one subscription now, with retries, bypassing
    /// the queue. Returns once the last attempt has been logged.
    pub async fn deliver(
        &self,
        subscription: &WebhookSubscription,
        event: EventType,
        data: serde_json::Value,
    ) -> DeliveryReport {
        let payload = WebhookPayload {
            event: event.as_str().to_string(),
            timestamp: Utc::now(),
            data,
        };
        let body = serde_json::to_vec(&payload).unwrap_or_default();
        self.engine.deliver(subscription, &payload, &body).await
    }

    /// Sends one unlogged `test` delivery and reports the result.
    pub async fn test_delivery(&self, subscription: &WebhookSubscription) -> TestDeliveryResult {
        let payload = WebhookPayload {
            event: TEST_EVENT.to_string(),
            timestamp: Utc::now(),
            data: serde_json::json!({
                "message": "This is a test webhook delivery",
                "webhook": subscription.name,
            }),
        };
        let body = serde_json::to_vec(&payload).unwrap_or_default();
        let result = self.engine.attempt(subscription, TEST_EVENT, &body).await;
        TestDeliveryResult {
            success: result.outcome == AttemptOutcome::Delivered,
            status_code: result.status,
            response_body: result.body,
            duration_ms: result.duration_ms,
            error: result.error,
        }
    }

    /// HTTP attempts currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.max_in_flight
            .saturating_sub(self.engine.permits.available_permits())
    }

    /// Stops accepting triggers, then waits for queued jobs and running
    /// delivery tasks to finish.
    pub async fn shutdown(&self) {
        drop(self.queue.write().take());
        let worker = self.worker.lock().await.take();
        if let Some(handle) = worker
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "webhook worker ended abnormally");
        }
        tracing::info!("webhook dispatcher drained");
    }
}

async fn run_worker(engine: Arc<DeliveryEngine>, mut rx: mpsc::Receiver<Job>) {
    let mut tasks = JoinSet::new();
    loop {
        tokio::select! {
            job = rx.recv() => match job {
                Some(job) => engine.fan_out(job, &mut tasks).await,
                None => break,
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "webhook delivery task failed");
                }
            }
        }
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "webhook delivery task failed");
        }
    }
}

impl DeliveryEngine {
    async fn fan_out(self: &Arc<Self>, job: Job, tasks: &mut JoinSet<()>) {
        let subscriptions = match self.store.active_for_event(job.event).await {
            Ok(subs) => subs,
            Err(e) => {
                tracing::error!(event = %job.event, error = %e, "failed to resolve webhook subscriptions");
                return;
            }
        };
        if subscriptions.is_empty() {
            return;
        }

        let payload = Arc::new(WebhookPayload {
            event: job.event.as_str().to_string(),
            timestamp: Utc::now(),
            data: job.data,
        });
        let body: Arc<[u8]> = serde_json::to_vec(payload.as_ref()).unwrap_or_default().into();

        for subscription in subscriptions {
            let engine = Arc::clone(self);
            let payload = Arc::clone(&payload);
            let body = Arc::clone(&body);
            tasks.spawn(async move {
                engine.deliver(&subscription, &payload, &body).await;
            });
        }
    }

    async fn deliver(
        &self,
        subscription: &WebhookSubscription,
        payload: &WebhookPayload,
        body: &[u8],
    ) -> DeliveryReport {
        let max_attempts = subscription.effective_retry_count();
        let mut attempt = 0;
        let mut last: Option<AttemptResult> = None;
        loop {
            attempt += 1;
            if let Some(previous) = last.take()
                && !self.still_subscribed(subscription).await
            {
                tracing::info!(
                    subscription_id = %subscription.id,
                    event = %payload.event,
                    attempts = attempt - 1,
                    "webhook subscription deleted, remaining attempts abandoned"
                );
                return DeliveryReport {
                    attempts: attempt - 1,
                    outcome: previous.outcome,
                    last_status: previous.status,
                    abandoned: true,
                };
            }

            let result = {
                let Ok(_permit) = self.permits.acquire().await else {
                    return DeliveryReport {
                        attempts: attempt - 1,
                        outcome: AttemptOutcome::Retryable,
                        last_status: None,
                        abandoned: true,
                    };
                };
                self.attempt(subscription, &payload.event, body).await
            };
            self.record(subscription, payload, attempt, &result).await;

            match result.outcome {
                AttemptOutcome::Delivered => {
                    tracing::info!(
                        subscription_id = %subscription.id,
                        event = %payload.event,
                        attempt,
                        status = result.status,
                        duration_ms = result.duration_ms,
                        "webhook delivered"
                    );
                }
                AttemptOutcome::Rejected => {
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        event = %payload.event,
                        attempt,
                        status = result.status,
                        "webhook rejected by receiver"
                    );
                }
                AttemptOutcome::Retryable if attempt < max_attempts => {
                    let backoff = self.backoff_unit.saturating_mul(attempt * attempt);
                    tracing::debug!(
                        subscription_id = %subscription.id,
                        event = %payload.event,
                        attempt,
                        backoff_ms = backoff.as_millis(),
                        error = result.error.as_deref().unwrap_or_default(),
                        "webhook attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    last = Some(result);
                    continue;
                }
                AttemptOutcome::Retryable => {
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        event = %payload.event,
                        attempts = attempt,
                        error = result.error.as_deref().unwrap_or_default(),
                        "webhook delivery failed after final attempt"
                    );
                }
            }
            return DeliveryReport {
                attempts: attempt,
                outcome: result.outcome,
                last_status: result.status,
                abandoned: false,
            };
        }
    }

    /// Whether the subscription still exists. Storage errors count as yes,
    /// so an unreachable store never cancels a delivery.
    async fn still_subscribed(&self, subscription: &WebhookSubscription) -> bool {
        match self.store.get(subscription.id).await {
            Ok(_) => true,
            Err(GatewayError::SubscriptionNotFound(_)) => false,
            Err(e) => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "could not confirm webhook subscription, retrying anyway"
                );
                true
            }
        }
    }

    async fn attempt(
        &self,
        subscription: &WebhookSubscription,
        event: &str,
        body: &[u8],
    ) -> AttemptResult {
        let headers = build_headers(subscription, event, body);
        let started = Instant::now();
        let sent = self
            .client
            .post(&subscription.url)
            .timeout(subscription.effective_timeout())
            .headers(headers)
            .body(body.to_vec())
            .send()
            .await;

        let result = match sent {
            Ok(response) => {
                let status = response.status().as_u16();
                let text = read_capped(response).await;
                let outcome = AttemptOutcome::from_status(status);
                AttemptResult {
                    outcome,
                    status: Some(status),
                    body: Some(truncate_body(&text)),
                    error: (outcome != AttemptOutcome::Delivered).then(|| format!("HTTP {status}")),
                    duration_ms: 0,
                }
            }
            Err(e) => {
                let error = if e.is_timeout() {
                    format!(
                        "request timed out after {}s",
                        subscription.effective_timeout().as_secs()
                    )
                } else if e.is_connect() {
                    format!("connection failed: {e}")
                } else {
                    format!("request error: {e}")
                };
                AttemptResult {
                    outcome: AttemptOutcome::Retryable,
                    status: None,
                    body: None,
                    error: Some(error),
                    duration_ms: 0,
                }
            }
        };
        AttemptResult {
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            ..result
        }
    }

    async fn record(
        &self,
        subscription: &WebhookSubscription,
        payload: &WebhookPayload,
        attempt: u32,
        result: &AttemptResult,
    ) {
        let entry = NewDeliveryLog {
            subscription_id: subscription.id,
            event_type: payload.event.clone(),
            payload: payload.data.clone(),
            response_status: result.status,
            response_body: result.body.clone(),
            error_message: result.error.clone(),
            attempt,
            duration_ms: result.duration_ms,
        };
        if let Err(e) = self.store.append_log(entry).await {
            tracing::error!(
                subscription_id = %subscription.id,
                attempt,
                error = %e,
                "failed to append webhook delivery log"
            );
        }
    }
}

/// Reads at most enough of the response body to fill a log entry.
async fn read_capped(response: reqwest::Response) -> String {
    let cap = MAX_LOGGED_BODY_CHARS * 4;
    let mut buf = Vec::new();
    let mut stream = std::pin::pin!(response.bytes_stream());
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        let room = cap.saturating_sub(buf.len());
        buf.extend_from_slice(chunk.get(..room.min(chunk.len())).unwrap_or_default());
        if buf.len() >= cap {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Request headers for one attempt. Subscriber headers may override the
/// defaults but never the signature.
fn build_headers(subscription: &WebhookSubscription, event: &str, body: &[u8]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(v) = HeaderValue::from_str(event) {
        headers.insert(EVENT_HEADER, v);
    }
    if let Ok(v) = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()) {
        headers.insert(DELIVERY_HEADER, v);
    }
    for (name, value) in &subscription.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(
                subscription_id = %subscription.id,
                header = %name,
                "skipping invalid custom webhook header"
            ),
        }
    }
    if let Some(secret) = subscription.secret.as_deref()
        && let Ok(v) = HeaderValue::from_str(&signature_header_value(secret, body))
    {
        headers.insert(SIGNATURE_HEADER, v);
    }
    headers
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::persistence::InMemoryWebhookStore;
    use crate::webhook::model::NewSubscription;
    use crate::webhook::signing::verify_signature;

    fn subscription(secret: Option<&str>, headers: &[(&str, &str)]) -> WebhookSubscription {
        WebhookSubscription::from_new(
            NewSubscription {
                name: "hr".into(),
                url: "http://127.0.0.1:1/hook".into(),
                secret: secret.map(str::to_string),
                events: vec![EventType::UserCreated],
                is_active: true,
                retry_count: 2,
                timeout_seconds: 1,
                headers: headers
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect::<BTreeMap<_, _>>(),
            },
            None,
        )
    }

    #[test]
    fn status_classification() {
        assert_eq!(AttemptOutcome::from_status(200), AttemptOutcome::Delivered);
        assert_eq!(AttemptOutcome::from_status(204), AttemptOutcome::Delivered);
        assert_eq!(AttemptOutcome::from_status(429), AttemptOutcome::Retryable);
        assert_eq!(AttemptOutcome::from_status(503), AttemptOutcome::Retryable);
        assert_eq!(AttemptOutcome::from_status(404), AttemptOutcome::Rejected);
        assert_eq!(AttemptOutcome::from_status(301), AttemptOutcome::Rejected);
    }

    #[test]
    fn headers_include_signature_when_secret_set() {
        let body = b"{}";
        let headers = build_headers(&subscription(Some("k"), &[]), "user.created", body);
        let Some(sig) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
            panic!("missing signature");
        };
        assert!(verify_signature("k", body, sig));
        assert_eq!(
            headers.get(EVENT_HEADER).and_then(|v| v.to_str().ok()),
            Some("user.created")
        );
        assert!(headers.get(DELIVERY_HEADER).is_some());
    }

    #[test]
    fn unsigned_without_secret() {
        let headers = build_headers(&subscription(None, &[]), "user.created", b"{}");
        assert!(headers.get(SIGNATURE_HEADER).is_none());
    }

    #[test]
    fn custom_headers_cannot_forge_signature() {
        let headers = build_headers(
            &subscription(Some("k"), &[("X-Webhook-Signature", "sha256=forged"), ("X-Team", "ops")]),
            "user.created",
            b"{}",
        );
        assert_ne!(
            headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()),
            Some("sha256=forged")
        );
        assert_eq!(headers.get("x-team").and_then(|v| v.to_str().ok()), Some("ops"));
    }

    #[test]
    fn invalid_custom_headers_are_skipped() {
        let headers = build_headers(
            &subscription(None, &[("bad header", "x")]),
            "user.created",
            b"{}",
        );
        assert_eq!(headers.len(), 3);
    }

    #[tokio::test]
    async fn trigger_after_shutdown_is_rejected() {
        let store: Arc<dyn WebhookStore> = Arc::new(InMemoryWebhookStore::new());
        let Ok(dispatcher) = WebhookDispatcher::new(store, DispatcherConfig::default()) else {
            panic!("dispatcher");
        };
        dispatcher.shutdown().await;
        assert_eq!(
            dispatcher.trigger(EventType::UserCreated, serde_json::json!({})),
            Err(DispatchError::Shutdown)
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_logs_every_attempt() {
        let store = Arc::new(InMemoryWebhookStore::new());
        let config = DispatcherConfig::default().with_backoff_unit(Duration::from_millis(1));
        let Ok(dispatcher) = WebhookDispatcher::new(Arc::clone(&store) as Arc<dyn WebhookStore>, config)
        else {
            panic!("dispatcher");
        };
        let Ok(sub) = store.create(subscription(None, &[])).await else {
            panic!("store rejected subscription");
        };
        let report = dispatcher
            .deliver(&sub, EventType::UserCreated, serde_json::json!({"id": 1}))
            .await;
        assert_eq!(report.attempts, 2);
        assert_eq!(report.outcome, AttemptOutcome::Retryable);
        assert!(!report.abandoned);

        let logs = store.logs(sub.id, 10).await.unwrap_or_default();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|e| e.response_status.is_none() && e.error_message.is_some()));
    }

    #[tokio::test]
    async fn unknown_subscription_stops_after_first_attempt() {
        let store = Arc::new(InMemoryWebhookStore::new());
        let config = DispatcherConfig::default().with_backoff_unit(Duration::from_millis(1));
        let Ok(dispatcher) = WebhookDispatcher::new(Arc::clone(&store) as Arc<dyn WebhookStore>, config)
        else {
            panic!("dispatcher");
        };
        let sub = subscription(None, &[]);
        let report = dispatcher
            .deliver(&sub, EventType::UserCreated, serde_json::json!({}))
            .await;
        assert_eq!(report.attempts, 1);
        assert!(report.abandoned);
        assert_eq!(store.logs(sub.id, 10).await.unwrap_or_default().len(), 1);
    }
}
