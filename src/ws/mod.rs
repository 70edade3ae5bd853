//! WebSocket layer: the Connection Hub and its wire protocol.
//!
//! The endpoint at `/ws` accepts one live connection per authenticated
//! identity. Business code pushes frames through [`Hub`]; clients may send
//! whitelisted frames back (`ping` is answered with `pong`).

pub mod connection;
pub mod handler;
pub mod hub;
pub mod messages;

pub use connection::{ConnectionHandle, ConnectionSettings, ConnectionState};
pub use hub::{Hub, HubStats, RouteOutcome};
