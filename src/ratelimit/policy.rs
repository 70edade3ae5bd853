//! Role-based admission policy layered over the sliding-window limiter.

use std::net::IpAddr;
use std::time::Duration;

use crate::domain::{Role, UserId};

/// Path prefixes that never count against a caller's budget.
pub const EXCLUDED_PREFIXES: [&str; 4] = ["/ws", "/health", "/swagger-ui", "/api-docs"];

/// Budget that applies to one caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// No admission check at all.
    Unlimited,
    /// At most this many requests per window.
    PerWindow(usize),
}

/// Per-role limits and the window they apply to.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    /// Requests per window for callers without an identity.
    pub anonymous_limit: usize,
    /// Requests per window for authenticated, non-admin callers.
    pub authenticated_limit: usize,
    /// Sliding window length.
    pub window: Duration,
    /// When set, `ADMIN` callers are never limited.
    pub admin_bypass: bool,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            anonymous_limit: 100,
            authenticated_limit: 500,
            window: Duration::from_secs(60),
            admin_bypass: true,
        }
    }
}

impl RateLimitPolicy {
    /// Returns the budget for a caller.
    #[must_use]
    pub fn limit_for(&self, user_id: Option<&UserId>, role: Option<Role>) -> Limit {
        match (user_id, role) {
            (Some(_), Some(Role::Admin)) if self.admin_bypass => Limit::Unlimited,
            (Some(_), _) => Limit::PerWindow(self.authenticated_limit),
            (None, _) => Limit::PerWindow(self.anonymous_limit),
        }
    }

    /// Returns `true` when `path` is exempt from rate limiting.
    #[must_use]
    pub fn is_excluded(path: &str) -> bool {
        EXCLUDED_PREFIXES.iter().any(|prefix| {
            path.strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

/// Builds the limiter key for a caller.
///
/// Authenticated callers are keyed by identity and address so one user on
/// two networks gets two windows; anonymous callers by address only.
#[must_use]
pub fn caller_key(user_id: Option<&UserId>, ip: Option<IpAddr>) -> String {
    let ip = ip.map_or_else(|| "unknown".to_string(), |ip| ip.to_string());
    match user_id {
        Some(user) => format!("user:{user}:ip:{ip}"),
        None => format!("ip:{ip}"),
    }
}
