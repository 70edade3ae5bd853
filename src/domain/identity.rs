//! Caller identity types supplied by the upstream auth layer.
//!
//! [`UserId`] is a newtype over the opaque identity string the auth proxy
//! hands us, and [`Role`] is the closed set of application roles. Both
//! are used as Hub registry keys and as rate-limiter key components.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Unique identifier of an authenticated user.
///
/// Identities are issued by the auth layer and treated as opaque here;
/// the only requirement is that they are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a `UserId` from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Application role attached to every authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Student submitting portfolios.
    Student,
    /// Registrar reviewing and approving portfolios.
    Registrar,
    /// Employer browsing approved portfolios.
    Employer,
    /// Administrator; may manage webhooks and bypasses rate limits.
    Admin,
}

impl Role {
    /// Returns the wire representation (`"STUDENT"`, `"ADMIN"`, ...).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "STUDENT",
            Self::Registrar => "REGISTRAR",
            Self::Employer => "EMPLOYER",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role string is not part of the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STUDENT" => Ok(Self::Student),
            "REGISTRAR" => Ok(Self::Registrar),
            "EMPLOYER" => Ok(Self::Employer),
            "ADMIN" => Ok(Self::Admin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}
