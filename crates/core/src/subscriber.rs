//! Subscriber input normalization and validation.

use validator::ValidateEmail;

use crate::error::CoreError;

/// Maximum length of a single subscriber tag.
pub const MAX_TAG_LENGTH: usize = 64;

/// Default group assigned to subscribers captured without one.
pub const DEFAULT_GROUP: &str = "General";

/// Trim and lower-case an email address.
///
/// Uniqueness is enforced on the normalized form, so `Jane@Example.com ` and
/// `jane@example.com` are the same subscriber.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalize and validate an email address, returning the normalized form.
pub fn validate_email(raw: &str) -> Result<String, CoreError> {
    let email = normalize_email(raw);
    if email.is_empty() {
        return Err(CoreError::Validation("Email is required".into()));
    }
    if !email.validate_email() {
        return Err(CoreError::Validation(format!(
            "'{email}' is not a valid email address"
        )));
    }
    Ok(email)
}

/// Normalize a tag: trimmed, inner whitespace collapsed, lower-cased.
pub fn normalize_tag(raw: &str) -> Result<String, CoreError> {
    let tag = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if tag.is_empty() {
        return Err(CoreError::Validation("Tag must not be empty".into()));
    }
    if tag.chars().count() > MAX_TAG_LENGTH {
        return Err(CoreError::Validation(format!(
            "Tag must be at most {MAX_TAG_LENGTH} characters"
        )));
    }
    Ok(tag)
}

/// Normalize a list of tags, dropping duplicates while keeping first-seen order.
pub fn normalize_tags(raw: &[String]) -> Result<Vec<String>, CoreError> {
    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for t in raw {
        let tag = normalize_tag(t)?;
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    Ok(tags)
}
