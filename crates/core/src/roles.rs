//! Well-known admin role name constants.
//!
//! These must match the `CHECK` constraint on `admin_users.role`.

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_EDITOR: &str = "editor";
