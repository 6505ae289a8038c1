//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts
//! - A `Deserialize` update DTO (all `Option` fields) for patches

pub mod admin_user;
pub mod automation;
pub mod delivery;
pub mod newsletter;
pub mod send_job;
pub mod session;
pub mod subscriber;
pub mod tracking;
