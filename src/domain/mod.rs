//! Domain layer: caller identities, roles, and the event vocabulary.
//!
//! These types are shared by the Connection Hub, the Webhook Dispatcher,
//! and the rate limiter. None of them hold state of their own.

pub mod event;
pub mod identity;

pub use event::{Envelope, EventType, Topic};
pub use identity::{Role, UserId};
