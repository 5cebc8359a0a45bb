//! Resource identifier generation and validation.
//!
//! Per the store's identifier grammar, a resource id is
//! `[A-Za-z0-9\-\.]{1,64}` — this is the FHIR `id` datatype's own constraint,
//! enforced here rather than left to callers.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-\.]{1,64}$").expect("static pattern is valid"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("id does not match [A-Za-z0-9\\-\\.]{{1,64}}: {0}")]
    Invalid(String),
}

/// Generate a fresh server-assigned id for `InstanceCreate` without a
/// client-supplied id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn validate_id(id: &str) -> Result<(), IdError> {
    if ID_PATTERN.is_match(id) {
        Ok(())
    } else {
        Err(IdError::Invalid(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_validate() {
        let id = generate_id();
        assert!(validate_id(&id).is_ok());
    }

    #[test]
    fn accepts_allowed_characters() {
        assert!(validate_id("abc-123.XYZ").is_ok());
        assert!(validate_id("a").is_ok());
        assert!(validate_id(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(validate_id("").is_err());
        assert!(validate_id(&"a".repeat(65)).is_err());
    }

    #[test]
    fn rejects_disallowed_characters() {
        assert!(validate_id("has space").is_err());
        assert!(validate_id("has/slash").is_err());
        assert!(validate_id("has_underscore").is_err());
    }
}
