//! Admin authentication primitives.
//!
//! - [`password`]: Argon2id hashing and verification of admin passwords.
//! - [`jwt`]: access-token signing/validation and refresh-token hashing.

pub mod jwt;
pub mod password;
