//! Shopify to Notion mirroring.
//!
//! Reads the product catalog and order history from a Shopify store and
//! upserts them into Notion databases keyed by the Shopify id, then lets you
//! search both systems for a keyword and compare what each side holds.
//!
//! # Security
//!
//! The Shopify access token has full store access and the Notion token can
//! write to every shared database. Both are held as [`secrecy::SecretString`]
//! and never logged.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod mapper;
pub mod notion;
pub mod pipeline;
pub mod rate_limit;
pub mod search;
pub mod shopify;
pub mod upsert;

pub use config::{ApiStyle, ConfigError, SyncConfig};
pub use error::{RecordError, SyncError};
pub use notion::{NotionClient, NotionError, RecordStore};
pub use pipeline::{
    FailedRecord, OrderStats, SyncKind, SyncOptions, SyncReport, SyncState, run_order_sync,
    run_product_sync,
};
pub use search::{SearchAggregator, SearchResults, SearchScope};
pub use shopify::{CatalogSource, ShopifyError};
