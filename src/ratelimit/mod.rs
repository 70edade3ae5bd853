//! Sliding-window rate limiting for the HTTP boundary.
//!
//! [`SlidingWindowLimiter`] is the shared-state core; [`RateLimitPolicy`]
//! decides which budget applies to a caller, and [`rate_limit`]
//! wires both into the router.

pub mod limiter;
pub mod middleware;
pub mod policy;

pub use limiter::{Admission, SlidingWindowLimiter};
pub use policy::{Limit, RateLimitPolicy};
pub use middleware::rate_limit;
