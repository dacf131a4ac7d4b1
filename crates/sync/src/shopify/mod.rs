//! Shopify Admin API source (HIGH PRIVILEGE - read-only use).
//!
//! # Security
//!
//! **The access token configured here has full store access.** This crate
//! only ever reads from the store; nothing in it issues mutations.
//!
//! # Architecture
//!
//! Two interchangeable [`CatalogSource`] implementations, picked by
//! [`ApiStyle`]:
//!
//! - [`GraphQlSource`] - query documents against the single GraphQL endpoint,
//!   cursor pagination via `pageInfo`, cost-based throttling.
//! - [`RestSource`] - resource-path REST, pagination via `Link` headers,
//!   `429` + `Retry-After` backoff.
//!
//! Both convert wire payloads into `storesync_core` types, so everything
//! downstream of [`fetch_all`] is style-agnostic.
//!
//! # Example
//!
//! ```rust,ignore
//! use storesync::shopify::{self, fetch_all_products};
//!
//! let source = shopify::connect(&config)?;
//! let products = fetch_all_products(source.as_ref()).await?;
//! ```

mod graphql;
mod rest;

pub use graphql::GraphQlSource;
pub use rest::RestSource;

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use storesync_core::{Order, Product};
use thiserror::Error;

use crate::config::{ApiStyle, SyncConfig};
use crate::rate_limit::RetriesExhausted;

/// Errors that can occur when reading from the Shopify Admin API.
#[derive(Debug, Error)]
pub enum ShopifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// GraphQL query returned errors.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Non-success HTTP status other than rate limiting.
    #[error("Unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// Still rate limited after the whole retry budget.
    #[error("Rate limit retries exhausted: {0}")]
    RetriesExhausted(#[from] RetriesExhausted),

    /// Authentication/authorization failed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A pagination URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// A GraphQL error returned by the Shopify Admin API.
#[derive(Debug, Clone)]
pub struct GraphQLError {
    /// Error message.
    pub message: String,
    /// Machine-readable code from `extensions.code`, if any.
    pub code: Option<String>,
    /// Source locations in the query.
    pub locations: Vec<GraphQLErrorLocation>,
    /// Path to the error in the response.
    pub path: Vec<serde_json::Value>,
}

/// Location in a GraphQL query where an error occurred.
#[derive(Debug, Clone)]
pub struct GraphQLErrorLocation {
    /// Line number (1-indexed).
    pub line: i64,
    /// Column number (1-indexed).
    pub column: i64,
}

fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.clone())
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Source abstraction
// =============================================================================

/// One page of a paginated collection.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Records in source order.
    pub items: Vec<T>,
    /// Token for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// A final page.
    #[must_use]
    pub const fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }

    /// Whether another page follows.
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.next_cursor.is_some()
    }
}

/// Products belonging to a collection found by handle.
#[derive(Debug, Clone)]
pub struct CollectionMatch {
    /// Collection handle.
    pub handle: String,
    /// Collection title.
    pub title: String,
    /// Member products (capped by the caller's limit).
    pub products: Vec<Product>,
}

/// Read access to the source catalog, independent of API style.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Which API style this source speaks.
    fn style(&self) -> ApiStyle;

    /// Fetch one page of products starting at `cursor` (`None` = first page).
    async fn product_page(&self, cursor: Option<String>) -> Result<Page<Product>, ShopifyError>;

    /// Fetch one page of orders starting at `cursor` (`None` = first page).
    async fn order_page(&self, cursor: Option<String>) -> Result<Page<Order>, ShopifyError>;

    /// Products that may match `keyword` in title, vendor, type, tags or SKU.
    ///
    /// Implementations may over-fetch; the search aggregator decides the
    /// matched field and applies the final cap.
    async fn search_products(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<Product>, ShopifyError>;

    /// Look up a collection by handle along with up to `limit` of its products.
    async fn collection_by_handle(
        &self,
        handle: &str,
        limit: usize,
    ) -> Result<Option<CollectionMatch>, ShopifyError>;
}

/// Build the source selected by `config.shopify.api_style`.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn connect(config: &SyncConfig) -> Result<Box<dyn CatalogSource>, ShopifyError> {
    Ok(match config.shopify.api_style {
        ApiStyle::GraphQl => Box::new(GraphQlSource::new(&config.shopify, &config.tuning)?),
        ApiStyle::Rest => Box::new(RestSource::new(&config.shopify, &config.tuning)?),
    })
}

/// Drain a paginated collection into one ordered `Vec`.
///
/// Starts with no cursor and follows `next_cursor` until a page signals the
/// end. Any page error aborts the whole fetch; pages already read are
/// discarded.
///
/// # Errors
///
/// Propagates the first error returned by `fetch_page`.
pub async fn fetch_all<T, E, F, Fut>(label: &str, mut fetch_page: F) -> Result<Vec<T>, E>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let mut all_items: Vec<T> = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = fetch_page(cursor.take()).await?;
        pages += 1;
        all_items.extend(page.items);

        tracing::debug!(label, pages, total_so_far = all_items.len(), "Fetched page");

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    tracing::info!(label, pages, total = all_items.len(), "Fetch complete");
    Ok(all_items)
}

/// Fetch every product from `source`.
///
/// # Errors
///
/// Returns the first page error.
pub async fn fetch_all_products(source: &dyn CatalogSource) -> Result<Vec<Product>, ShopifyError> {
    fetch_all("products", |cursor| source.product_page(cursor)).await
}

/// Fetch every order from `source`.
///
/// # Errors
///
/// Returns the first page error.
pub async fn fetch_all_orders(source: &dyn CatalogSource) -> Result<Vec<Order>, ShopifyError> {
    fetch_all("orders", |cursor| source.order_page(cursor)).await
}

// =============================================================================
// Conversion helpers shared by both styles
// =============================================================================

/// Parse an RFC 3339 timestamp, dropping unparseable values.
fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Treat blank strings as absent.
fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Truncate an error body for inclusion in an error message.
fn truncate_body(body: &str) -> String {
    body.chars().take(500).collect()
}
