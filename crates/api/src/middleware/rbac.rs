//! Role checks layered on [`AuthUser`].
//!
//! Destructive admin operations take [`RequireAdmin`]; everything else under
//! `/admin` takes [`RequireAuth`].

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use newsroom_core::error::CoreError;
use newsroom_core::roles::{ROLE_ADMIN, ROLE_EDITOR};

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// Requires the `admin` role; 403 otherwise.
pub struct RequireAdmin(pub AuthUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != ROLE_ADMIN {
            return Err(AppError::Core(CoreError::Forbidden(
                "Admin role required".into(),
            )));
        }
        Ok(RequireAdmin(user))
    }
}

/// Requires a valid token with a known role (`admin` or `editor`).
pub struct RequireAuth(pub AuthUser);

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != ROLE_ADMIN && user.role != ROLE_EDITOR {
            return Err(AppError::Core(CoreError::Forbidden(format!(
                "Unknown role: {}",
                user.role
            ))));
        }
        Ok(RequireAuth(user))
    }
}
