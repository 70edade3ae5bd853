//! Service layer: business logic orchestration.
//!
//! [`EventService`] fans domain events out to the Hub and the webhook
//! Dispatcher; [`WebhookService`] backs the administrator endpoints.

pub mod event_service;
pub mod webhook_service;

pub use event_service::{EventService, PublishReport};
pub use webhook_service::WebhookService;
