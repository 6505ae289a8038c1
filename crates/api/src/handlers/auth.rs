//! Admin login, token refresh and logout.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{Duration, Utc};
use newsroom_core::error::CoreError;
use newsroom_core::subscriber::normalize_email;
use newsroom_core::types::DbId;
use newsroom_db::models::admin_user::AdminUser;
use newsroom_db::models::session::CreateSession;
use newsroom_db::repositories::{AdminUserRepo, SessionRepo};
use serde::{Deserialize, Serialize};

use crate::auth::jwt::{generate_access_token, generate_refresh_token, hash_refresh_token};
use crate::auth::password::verify_password;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Consecutive failed logins that lock an account.
pub const MAX_FAILED_ATTEMPTS: i32 = 5;

/// Lock duration after too many failed logins.
pub const LOCK_DURATION_MINS: i64 = 15;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Returned by login and refresh.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: AdminInfo,
}

#[derive(Debug, Serialize)]
pub struct AdminInfo {
    pub id: DbId,
    pub email: String,
    pub role: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> AppResult<Json<DataResponse<AuthResponse>>> {
    let email = normalize_email(&input.email);
    let user = AdminUserRepo::find_by_email(&state.pool, &email)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::Unauthorized(INVALID_CREDENTIALS.into())))?;

    if !user.is_active {
        return Err(AppError::Core(CoreError::Forbidden(
            "Account is deactivated".into(),
        )));
    }
    if user.locked_until.is_some_and(|until| until > Utc::now()) {
        return Err(AppError::Core(CoreError::Forbidden(
            "Account is temporarily locked. Try again later.".into(),
        )));
    }

    let valid = verify_password(&input.password, &user.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;

    if !valid {
        AdminUserRepo::increment_failed_login(&state.pool, user.id).await?;
        if user.failed_login_count + 1 >= MAX_FAILED_ATTEMPTS {
            let until = Utc::now() + Duration::minutes(LOCK_DURATION_MINS);
            AdminUserRepo::lock_account(&state.pool, user.id, until).await?;
            tracing::warn!(user_id = user.id, "Admin account locked after failed logins");
        }
        return Err(AppError::Core(CoreError::Unauthorized(
            INVALID_CREDENTIALS.into(),
        )));
    }

    AdminUserRepo::record_successful_login(&state.pool, user.id).await?;
    tracing::info!(user_id = user.id, "Admin logged in");

    let response = create_auth_response(&state, &user).await?;
    Ok(Json(DataResponse::new(response)))
}

/// POST /api/v1/auth/refresh
///
/// The presented refresh token is revoked and replaced.
pub async fn refresh(
    State(state): State<AppState>,
    Json(input): Json<RefreshRequest>,
) -> AppResult<Json<DataResponse<AuthResponse>>> {
    let hash = hash_refresh_token(&input.refresh_token);
    let session = SessionRepo::find_by_refresh_token_hash(&state.pool, &hash)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid or expired refresh token".into(),
            ))
        })?;

    SessionRepo::revoke(&state.pool, session.id).await?;

    let user = AdminUserRepo::find_by_id(&state.pool, session.user_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::Unauthorized("User no longer exists".into())))?;
    if !user.is_active {
        return Err(AppError::Core(CoreError::Forbidden(
            "Account is deactivated".into(),
        )));
    }

    let response = create_auth_response(&state, &user).await?;
    Ok(Json(DataResponse::new(response)))
}

/// POST /api/v1/auth/logout
///
/// Revokes every session of the caller.
pub async fn logout(State(state): State<AppState>, user: AuthUser) -> AppResult<StatusCode> {
    let revoked = SessionRepo::revoke_all_for_user(&state.pool, user.user_id).await?;
    tracing::info!(user_id = user.user_id, revoked, "Admin logged out");
    Ok(StatusCode::NO_CONTENT)
}

async fn create_auth_response(state: &AppState, user: &AdminUser) -> AppResult<AuthResponse> {
    let jwt = &state.config.jwt;
    let access_token = generate_access_token(user.id, &user.role, jwt)
        .map_err(|e| AppError::InternalError(format!("Token generation error: {e}")))?;

    let (refresh_token, refresh_token_hash) = generate_refresh_token();
    SessionRepo::create(
        &state.pool,
        &CreateSession {
            user_id: user.id,
            refresh_token_hash,
            expires_at: Utc::now() + Duration::days(jwt.refresh_token_expiry_days),
        },
    )
    .await?;

    Ok(AuthResponse {
        access_token,
        refresh_token,
        expires_in: jwt.access_token_expiry_secs(),
        user: AdminInfo {
            id: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
        },
    })
}
