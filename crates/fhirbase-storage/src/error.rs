//! The store-wide error taxonomy.
//!
//! Every interaction failure — across search, storage, notify — ultimately
//! becomes a [`StoreError`]. It carries everything needed to answer a
//! request: an HTTP status via [`StoreError::status_code`] and a FHIR
//! `OperationOutcome.issue.code` via [`StoreError::outcome_code`].

use std::fmt;

/// Errors that can occur while serving a FHIR interaction against the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The request body failed to deserialize, or referenced an unknown
    /// search parameter while running in strict mode.
    #[error("malformed input: {message}")]
    MalformedInput { message: String },

    /// The interaction named a resource type this tenant does not support.
    #[error("unsupported resource type: {resource_type}")]
    UnsupportedType { resource_type: String },

    /// `(resource_type, id)` is not present for a read/update/delete-by-id.
    #[error("resource not found: {resource_type}/{id}")]
    NotFound { resource_type: String, id: String },

    /// `If-Match`/`If-None-Match` did not match the current version.
    #[error("precondition failed: expected {expected}, found {actual}")]
    PreconditionFailed { expected: String, actual: String },

    /// Conditional create matched more than one resource, or an id
    /// collision occurred with `allowExistingId` disabled.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// `sourceFormat`/`destFormat` (or similar) named an unrecognized media type.
    #[error("unsupported media type: {media_type}")]
    UnsupportedMediaType { media_type: String },

    /// The resource failed structural validation or a business-rule invariant.
    #[error("invariant violated: {message}")]
    Invariant { message: String },

    /// The caller cancelled the operation in progress.
    #[error("cancelled")]
    Cancelled,

    /// An invariant was violated inside the store itself.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl StoreError {
    pub fn malformed_input(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }

    pub fn unsupported_type(resource_type: impl Into<String>) -> Self {
        Self::UnsupportedType {
            resource_type: resource_type.into(),
        }
    }

    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    pub fn precondition_failed(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn unsupported_media_type(media_type: impl Into<String>) -> Self {
        Self::UnsupportedMediaType {
            media_type: media_type.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::PreconditionFailed { .. })
    }

    /// The HTTP status the transport layer should return.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MalformedInput { .. } => 400,
            Self::UnsupportedType { .. } | Self::NotFound { .. } => 404,
            Self::PreconditionFailed { .. } => 412,
            Self::Conflict { .. } => 409,
            Self::UnsupportedMediaType { .. } => 415,
            Self::Invariant { .. } => 422,
            Self::Cancelled => 499,
            Self::Internal { .. } => 500,
        }
    }

    /// The FHIR `OperationOutcome.issue.code` value for this error.
    pub fn outcome_code(&self) -> &'static str {
        match self {
            Self::MalformedInput { .. } => "structure",
            Self::UnsupportedType { .. } => "not-supported",
            Self::NotFound { .. } => "not-found",
            Self::PreconditionFailed { .. } => "conflict",
            Self::Conflict { .. } => "conflict",
            Self::UnsupportedMediaType { .. } => "not-supported",
            Self::Invariant { .. } => "invariant",
            Self::Cancelled => "transient",
            Self::Internal { .. } => "exception",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MalformedInput { .. } => ErrorCategory::Validation,
            Self::UnsupportedType { .. } => ErrorCategory::NotFound,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::PreconditionFailed { .. } | Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::UnsupportedMediaType { .. } => ErrorCategory::Validation,
            Self::Invariant { .. } => ErrorCategory::Validation,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Coarse bucket for logging/metrics — finer-grained than [`StoreError`]'s
/// variants, coarser than `outcome_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    NotFound,
    Conflict,
    Validation,
    Cancelled,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(StoreError::malformed_input("bad json").status_code(), 400);
        assert_eq!(StoreError::unsupported_type("Foo").status_code(), 404);
        assert_eq!(StoreError::not_found("Patient", "1").status_code(), 404);
        assert_eq!(
            StoreError::precondition_failed("1", "2").status_code(),
            412
        );
        assert_eq!(StoreError::conflict("dup").status_code(), 409);
        assert_eq!(
            StoreError::unsupported_media_type("text/xml").status_code(),
            415
        );
        assert_eq!(StoreError::invariant("bad").status_code(), 422);
        assert_eq!(StoreError::Cancelled.status_code(), 499);
        assert_eq!(StoreError::internal("oops").status_code(), 500);
    }

    #[test]
    fn outcome_codes_are_fhir_issue_types() {
        assert_eq!(StoreError::not_found("Patient", "1").outcome_code(), "not-found");
        assert_eq!(StoreError::invariant("bad").outcome_code(), "invariant");
        assert_eq!(StoreError::conflict("dup").outcome_code(), "conflict");
    }

    #[test]
    fn predicates() {
        assert!(StoreError::not_found("Patient", "1").is_not_found());
        assert!(StoreError::conflict("dup").is_conflict());
        assert!(StoreError::precondition_failed("1", "2").is_conflict());
        assert!(!StoreError::invariant("bad").is_not_found());
    }

    #[test]
    fn display_messages() {
        let err = StoreError::not_found("Patient", "123");
        assert_eq!(err.to_string(), "resource not found: Patient/123");
    }
}
