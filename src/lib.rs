//! # relay-gateway
//!
//! Event distribution gateway: pushes real-time frames to connected users,
//! relays business events to external systems as signed webhooks, and
//! rate-limits the HTTP surface.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)        External receivers
//!     │                                   ▲
//!     ├── Rate limiter (ratelimit/)       │ signed POST
//!     ├── REST Handlers (api/)            │
//!     ├── WS Handler (ws/)                │
//!     │                                   │
//!     ├── EventService (service/) ────────┤
//!     │      ├── Hub (ws/)                │
//!     │      └── WebhookDispatcher (webhook/)
//!     │
//!     └── WebhookStore (persistence/): PostgreSQL or in-memory
//! ```

pub mod api;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod ratelimit;
pub mod router;
pub mod service;
pub mod webhook;
pub mod ws;
