//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use serde_json::Value;

use relay_gateway::app_state::AppState;
use relay_gateway::auth::{USER_ID_HEADER, USER_ROLE_HEADER};
use relay_gateway::config::GatewayConfig;
use relay_gateway::domain::{EventType, Role};
use relay_gateway::persistence::{InMemoryWebhookStore, WebhookStore};
use relay_gateway::router::build_app;
use relay_gateway::webhook::model::NewSubscription;
use relay_gateway::webhook::{DispatcherConfig, WebhookSubscription};

/// Backoff unit used everywhere in tests so retries finish quickly.
pub const TEST_BACKOFF: Duration = Duration::from_millis(10);

/// Gateway configuration for tests: in-memory store, default limits.
pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        persistence_enabled: false,
        ..GatewayConfig::default()
    }
}

/// Dispatcher settings with millisecond backoff.
pub fn fast_dispatcher() -> DispatcherConfig {
    DispatcherConfig::default().with_backoff_unit(TEST_BACKOFF)
}

/// Application state over a fresh in-memory store.
pub fn test_state(config: &GatewayConfig) -> (AppState, Arc<InMemoryWebhookStore>) {
    let store = Arc::new(InMemoryWebhookStore::new());
    let dyn_store: Arc<dyn WebhookStore> = Arc::clone(&store) as Arc<dyn WebhookStore>;
    let Ok(state) = AppState::with_dispatcher_config(dyn_store, config, fast_dispatcher()) else {
        panic!("failed to build application state");
    };
    (state, store)
}

/// Binds the full application on an ephemeral port and serves it in the
/// background.
pub async fn spawn_server(state: AppState) -> SocketAddr {
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("failed to bind test listener");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("listener has no local address");
    };
    let app = build_app(state);
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });
    addr
}

/// Validated subscription pointing at `url`.
pub fn subscription(url: &str, events: &[EventType], retry_count: u32) -> WebhookSubscription {
    let new = NewSubscription {
        name: "integration".into(),
        url: url.to_string(),
        secret: Some("whsec_integration".into()),
        events: events.to_vec(),
        is_active: true,
        retry_count,
        timeout_seconds: 2,
        headers: BTreeMap::new(),
    };
    let Ok(new) = new.validated() else {
        panic!("fixture subscription rejected");
    };
    WebhookSubscription::from_new(new, None)
}

/// Builds a request carrying the identity headers when `caller` is set.
pub fn request(
    method: Method,
    uri: &str,
    caller: Option<(&str, Role)>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((user_id, role)) = caller {
        builder = builder
            .header(USER_ID_HEADER, user_id)
            .header(USER_ROLE_HEADER, role.as_str());
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let Ok(request) = builder.body(body) else {
        panic!("invalid test request");
    };
    request
}

/// Reads a response body as JSON; `Value::Null` for empty bodies.
pub async fn json_body(response: Response<Body>) -> Value {
    let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
        panic!("failed to read response body");
    };
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Polls `check` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..250 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
