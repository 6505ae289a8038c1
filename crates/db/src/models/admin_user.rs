//! Admin user model and DTOs.

use newsroom_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `admin_users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AdminUser {
    pub id: DbId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub failed_login_count: i32,
    pub locked_until: Option<Timestamp>,
    pub last_login_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating an admin user. The password is already hashed.
#[derive(Debug, Clone)]
pub struct CreateAdminUser {
    pub email: String,
    pub password_hash: String,
    pub role: String,
}
