//! Top-level error type for sync and search runs.

use thiserror::Error;

use crate::config::ConfigError;
use crate::mapper::MappingError;
use crate::notion::NotionError;
use crate::shopify::ShopifyError;

/// Anything that can abort a whole run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The source fetch failed.
    #[error("Shopify error: {0}")]
    Shopify(#[from] ShopifyError),

    /// The workspace could not be reached or rejected a request.
    #[error("Notion error: {0}")]
    Notion(#[from] NotionError),

    /// Writing an export file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding an export failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A failure confined to one record; the batch continues.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The record could not be mapped to properties.
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// The workspace rejected the lookup or write.
    #[error("Notion error: {0}")]
    Notion(#[from] NotionError),
}
