//! Requester identity forwarded by the gateway.
//!
//! The gateway authenticates callers and passes `X-User-Id` and
//! `X-User-Role` along; they are trusted here.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{Requester, Role, UserId};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Extracts the [`Requester`] from identity headers. A missing role means `USER`.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Requester);

impl Identity {
    /// Rejects non-admins.
    pub fn require_admin(&self, action: &str) -> Result<(), ApiError> {
        if self.0.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!("only admins may {action}")))
        }
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .map(|value| {
                    value
                        .to_str()
                        .map(str::trim)
                        .map_err(|_| ApiError::Unauthenticated(format!("{name} is not valid text")))
                })
                .transpose()
        };

        let user_id = header(USER_ID_HEADER)?
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {USER_ID_HEADER} header")))?;
        let user_id = UserId::parse(user_id)
            .map_err(|e| ApiError::Unauthenticated(format!("invalid {USER_ID_HEADER}: {e}")))?;

        let role = match header(USER_ROLE_HEADER)? {
            Some(role) => role.parse::<Role>().map_err(ApiError::Unauthenticated)?,
            None => Role::User,
        };

        Ok(Identity(Requester { user_id, role }))
    }
}
