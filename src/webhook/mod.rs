//! Webhook Dispatcher: signed, retried relay of business events to
//! external HTTP subscribers.

pub mod dispatcher;
pub mod model;
pub mod signing;

pub use dispatcher::{DispatchError, DispatcherConfig, WebhookDispatcher};
pub use model::{SubscriptionId, WebhookSubscription};
