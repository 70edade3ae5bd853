//! Caller identity supplied by the upstream auth proxy.
//!
//! The gateway does not authenticate anyone itself. A trusted proxy in
//! front of it sets `X-User-Id` and `X-User-Role`; these extractors turn
//! those headers into typed identities and enforce the two access rules
//! the gateway needs: "must be signed in" and "must be an administrator".

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::domain::{Role, UserId};
use crate::error::GatewayError;

/// Header carrying the caller's identity.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Possibly-anonymous caller. Never rejects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Identity, when the proxy supplied one.
    pub user_id: Option<UserId>,
    /// Role, when the proxy supplied a recognised one.
    pub role: Option<Role>,
}

impl CallerIdentity {
    /// Reads the identity headers. Blank or unrecognised values count as absent.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let user_id = header_str(headers, USER_ID_HEADER).map(UserId::new);
        let role = header_str(headers, USER_ROLE_HEADER).and_then(|r| r.parse().ok());
        Self { user_id, role }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl<S: Send + Sync> FromRequestParts<S> for CallerIdentity {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

/// Signed-in caller. Rejects with `401` when identity or role is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Caller identity.
    pub user_id: UserId,
    /// Caller role.
    pub role: Role,
}

impl TryFrom<CallerIdentity> for AuthenticatedUser {
    type Error = GatewayError;

    fn try_from(caller: CallerIdentity) -> Result<Self, Self::Error> {
        match (caller.user_id, caller.role) {
            (Some(user_id), Some(role)) => Ok(Self { user_id, role }),
            _ => Err(GatewayError::Unauthorized),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::try_from(CallerIdentity::from_headers(&parts.headers))
    }
}

/// Administrator. Rejects with `401` when anonymous and `403` for other roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::try_from(CallerIdentity::from_headers(&parts.headers))?;
        if user.role == Role::Admin {
            Ok(Self(user.user_id))
        } else {
            Err(GatewayError::Forbidden(format!(
                "role {} may not access administrator endpoints",
                user.role
            )))
        }
    }
}
