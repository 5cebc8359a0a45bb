//! Tenant configuration loading and hot-reload for FHIRbase stores.
//!
//! A [`tenant::TenantConfig`] is validated once at `Init`. The only part of
//! it that may change afterwards is its `channels` table, reloaded in place
//! by [`watcher::ConfigWatcher`] from the backing TOML file.

pub mod events;
pub mod tenant;
pub mod watcher;

pub use events::{ConfigCategory, ConfigChangeEvent, ConfigOperation};
pub use tenant::{ChannelEndpoint, TenantConfig};
pub use watcher::{ConfigWatcher, WatchHandle};

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
