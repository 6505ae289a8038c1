//! Request extractors for admin authentication.
//!
//! - [`auth::AuthUser`]: the admin behind a Bearer access token.
//! - [`rbac::RequireAdmin`]: requires the `admin` role.
//! - [`rbac::RequireAuth`]: any valid token (`admin` or `editor`).

pub mod auth;
pub mod rbac;
