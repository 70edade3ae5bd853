//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::persistence::WebhookStore;
use crate::ratelimit::{RateLimitPolicy, SlidingWindowLimiter};
use crate::service::{EventService, WebhookService};
use crate::webhook::{DispatcherConfig, WebhookDispatcher};
use crate::ws::{ConnectionSettings, Hub};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Live connection registry.
    pub hub: Arc<Hub>,
    /// Webhook dispatcher.
    pub dispatcher: Arc<WebhookDispatcher>,
    /// Fan-out facade for business events.
    pub events: EventService,
    /// Webhook administration.
    pub webhooks: WebhookService,
    /// Per-caller sliding windows.
    pub rate_limiter: Arc<SlidingWindowLimiter>,
    /// Which budget applies to which caller.
    pub rate_policy: RateLimitPolicy,
    /// Settings for new WebSocket connections.
    pub connection_settings: ConnectionSettings,
}

impl AppState {
    /// Wires the Hub, Dispatcher and limiter over `store`.
    ///
    /// Must be called inside a Tokio runtime: the dispatcher spawns its
    /// worker immediately.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if the HTTP client cannot be built.
    pub fn new(store: Arc<dyn WebhookStore>, config: &GatewayConfig) -> Result<Self, GatewayError> {
        Self::with_dispatcher_config(store, config, config.dispatcher_config())
    }

    /// Like [`Self::new`] with explicit dispatcher settings.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if the HTTP client cannot be built.
    pub fn with_dispatcher_config(
        store: Arc<dyn WebhookStore>,
        config: &GatewayConfig,
        dispatcher_config: DispatcherConfig,
    ) -> Result<Self, GatewayError> {
        let hub = Arc::new(Hub::new());
        let dispatcher = Arc::new(WebhookDispatcher::new(
            Arc::clone(&store),
            dispatcher_config,
        )?);
        Ok(Self {
            events: EventService::new(Arc::clone(&hub), Arc::clone(&dispatcher)),
            webhooks: WebhookService::new(store, Arc::clone(&dispatcher)),
            hub,
            dispatcher,
            rate_limiter: Arc::new(SlidingWindowLimiter::new()),
            rate_policy: config.rate_limit_policy(),
            connection_settings: config.connection_settings(),
        })
    }
}
