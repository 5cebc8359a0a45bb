//! Configuration change events.
//!
//! The store's tenant configuration is immutable after `Init`, with one
//! exception: notification channel endpoints may be hot-reloaded from the
//! backing file. [`ConfigChangeEvent`] is what the file watcher emits when it
//! detects such a change; any other field found to differ on reload is
//! reported as [`ConfigOperation::Rejected`] instead of applied.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Category of the changed section, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigCategory {
    /// `[channels]` — notification delivery endpoints.
    Channels,
    /// Any other section (resource types, FHIR version, tenant id).
    Immutable,
}

impl std::fmt::Display for ConfigCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Channels => write!(f, "channels"),
            Self::Immutable => write!(f, "immutable"),
        }
    }
}

/// Outcome of a detected file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOperation {
    /// Channel endpoints were reloaded.
    Reloaded,
    /// A change touched an immutable section; the reload was ignored.
    Rejected,
}

impl std::fmt::Display for ConfigOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reloaded => write!(f, "reloaded"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Event emitted by [`crate::watcher::ConfigWatcher`] on every detected change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigChangeEvent {
    pub category: ConfigCategory,
    pub operation: ConfigOperation,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub detail: Option<String>,
}

impl ConfigChangeEvent {
    pub fn reloaded_channels() -> Self {
        Self {
            category: ConfigCategory::Channels,
            operation: ConfigOperation::Reloaded,
            timestamp: OffsetDateTime::now_utc(),
            detail: None,
        }
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self {
            category: ConfigCategory::Immutable,
            operation: ConfigOperation::Rejected,
            timestamp: OffsetDateTime::now_utc(),
            detail: Some(detail.into()),
        }
    }
}
