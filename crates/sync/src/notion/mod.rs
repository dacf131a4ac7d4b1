//! Notion workspace client (the mirror target).
//!
//! # API Reference
//!
//! - Base URL: `https://api.notion.com/v1`
//! - Authentication: integration token via `Authorization: Bearer <token>`
//! - API Version: set via the `Notion-Version` header
//!
//! Writes are paced through a [`WritePacer`] to stay under the workspace
//! request ceiling, and `429` responses go through the shared [`RetryPolicy`].

mod properties;

pub use properties::{
    EXTERNAL_ID_PROPERTY, PropertyMap, PropertyValue, TITLE_PROPERTY, WorkspaceRecord,
    encode_properties,
};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::instrument;

use crate::config::{NotionConfig, SyncTuning, bearer};
use crate::rate_limit::{Attempt, RetriesExhausted, RetryPolicy, WritePacer, parse_retry_after};

/// Notion API base URL.
const BASE_URL: &str = "https://api.notion.com/v1";

/// Largest `page_size` a database query accepts.
const MAX_QUERY_PAGE: usize = 100;

/// Errors that can occur when talking to the Notion API.
#[derive(Debug, Error)]
pub enum NotionError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error object.
    #[error("API error: {status} {code} - {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Failed to parse a response.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Invalid or missing integration token, or no access to the database.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Still rate limited after the whole retry budget.
    #[error("Rate limit retries exhausted: {0}")]
    RetriesExhausted(#[from] RetriesExhausted),

    /// A configured value cannot be sent as a header.
    #[error("Invalid header value for {0}")]
    InvalidHeader(String),
}

/// Error object returned by the API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageRef {
    id: String,
}

/// Record-level access to the mirror databases.
///
/// The sync pipeline and search aggregator only see this trait, so they can
/// be exercised against an in-memory store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Page id of the record whose external-id property equals `external_id`.
    async fn find_by_external_id(
        &self,
        database_id: &str,
        external_id: &str,
    ) -> Result<Option<String>, NotionError>;

    /// Create a record in `database_id`, returning its page id.
    async fn create_record(
        &self,
        database_id: &str,
        properties: &PropertyMap,
    ) -> Result<String, NotionError>;

    /// Overwrite every given property of an existing record.
    async fn update_record(&self, page_id: &str, properties: &PropertyMap)
    -> Result<(), NotionError>;

    /// Records matching `keyword` on name, vendor, product type, tags or SKU.
    async fn search(
        &self,
        database_id: &str,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<WorkspaceRecord>, NotionError>;
}

/// Notion API client.
#[derive(Clone)]
pub struct NotionClient {
    inner: Arc<NotionClientInner>,
}

struct NotionClientInner {
    client: reqwest::Client,
    pacer: WritePacer,
    retry: RetryPolicy,
}

impl NotionClient {
    /// Create a new Notion API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the token or version is not a valid header value,
    /// or if the HTTP client fails to build.
    pub fn new(config: &NotionConfig, tuning: &SyncTuning) -> Result<Self, NotionError> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "Authorization",
            HeaderValue::from_str(&bearer(&config.api_key))
                .map_err(|_| NotionError::InvalidHeader("Authorization".to_string()))?,
        );
        headers.insert(
            "Notion-Version",
            HeaderValue::from_str(&config.version)
                .map_err(|_| NotionError::InvalidHeader("Notion-Version".to_string()))?,
        );
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(NotionClientInner {
                client,
                pacer: WritePacer::new(tuning.write_delay),
                retry: RetryPolicy::from_tuning(tuning),
            }),
        })
    }

    /// Send a request, retrying on `429`. Writes wait for the pacer first.
    async fn request<T: serde::de::DeserializeOwned + Send>(
        &self,
        method: Method,
        path: &str,
        body: &Value,
    ) -> Result<T, NotionError> {
        let is_write = method != Method::GET && !path.ends_with("/query");
        self.inner
            .retry
            .run(path, || {
                let method = method.clone();
                async move {
                    if is_write {
                        self.inner.pacer.wait().await;
                    }
                    self.send_once(method, path, body).await
                }
            })
            .await
    }

    async fn send_once<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &Value,
    ) -> Result<Attempt<T>, NotionError> {
        let url = format!("{BASE_URL}{path}");
        let response = self
            .inner
            .client
            .request(method, &url)
            .json(body)
            .send()
            .await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Attempt::RateLimited {
                retry_after: parse_retry_after(response.headers()),
            });
        }

        let text = response.text().await?;
        if status.is_success() {
            return Ok(Attempt::Done(serde_json::from_str(&text)?));
        }

        Err(parse_error(status, &text))
    }

    /// Query one page of a database.
    async fn query(
        &self,
        database_id: &str,
        filter: Value,
        page_size: usize,
        start_cursor: Option<String>,
    ) -> Result<QueryResponse, NotionError> {
        let mut body = json!({
            "filter": filter,
            "page_size": page_size.clamp(1, MAX_QUERY_PAGE),
        });
        if let Some(cursor) = start_cursor {
            body["start_cursor"] = Value::String(cursor);
        }
        self.request(Method::POST, &format!("/databases/{database_id}/query"), &body)
            .await
    }
}

/// Build a [`NotionError`] from a non-success response body.
fn parse_error(status: StatusCode, text: &str) -> NotionError {
    let parsed: Option<ApiErrorBody> = serde_json::from_str(text).ok();
    let (code, message) = parsed.map_or_else(
        || ("unknown".to_string(), text.chars().take(500).collect()),
        |b| (b.code, b.message),
    );

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return NotionError::Unauthorized(message);
    }
    NotionError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

/// Exact-match filter on the external-id property.
#[must_use]
pub fn external_id_filter(external_id: &str) -> Value {
    json!({
        "property": EXTERNAL_ID_PROPERTY,
        "rich_text": { "equals": external_id }
    })
}

/// OR filter over every searchable product property.
#[must_use]
pub fn keyword_filter(keyword: &str) -> Value {
    json!({
        "or": [
            { "property": TITLE_PROPERTY, "title": { "contains": keyword } },
            { "property": "Vendor", "select": { "equals": keyword } },
            { "property": "Product Type", "select": { "equals": keyword } },
            { "property": "Tags", "multi_select": { "contains": keyword } },
            { "property": "SKU", "rich_text": { "contains": keyword } }
        ]
    })
}

#[async_trait]
impl RecordStore for NotionClient {
    #[instrument(skip(self))]
    async fn find_by_external_id(
        &self,
        database_id: &str,
        external_id: &str,
    ) -> Result<Option<String>, NotionError> {
        let response = self
            .query(database_id, external_id_filter(external_id), 1, None)
            .await?;
        Ok(response
            .results
            .first()
            .and_then(|page| page["id"].as_str())
            .map(String::from))
    }

    #[instrument(skip(self, properties))]
    async fn create_record(
        &self,
        database_id: &str,
        properties: &PropertyMap,
    ) -> Result<String, NotionError> {
        let body = json!({
            "parent": { "database_id": database_id },
            "properties": encode_properties(properties),
        });
        let page: PageRef = self.request(Method::POST, "/pages", &body).await?;
        Ok(page.id)
    }

    #[instrument(skip(self, properties))]
    async fn update_record(
        &self,
        page_id: &str,
        properties: &PropertyMap,
    ) -> Result<(), NotionError> {
        let body = json!({ "properties": encode_properties(properties) });
        let _: PageRef = self
            .request(Method::PATCH, &format!("/pages/{page_id}"), &body)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn search(
        &self,
        database_id: &str,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<WorkspaceRecord>, NotionError> {
        let mut records = Vec::new();
        let mut cursor = None;

        loop {
            let remaining = limit.saturating_sub(records.len());
            let response = self
                .query(database_id, keyword_filter(keyword), remaining, cursor)
                .await?;
            records.extend(response.results.iter().map(WorkspaceRecord::from_page));

            match response.next_cursor {
                Some(next) if response.has_more && records.len() < limit => cursor = Some(next),
                _ => break,
            }
        }

        records.truncate(limit);
        Ok(records)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_reads_api_object() {
        let body = r#"{"object":"error","status":400,"code":"validation_error","message":"Tags is not a property that exists."}"#;
        match parse_error(StatusCode::BAD_REQUEST, body) {
            NotionError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, "validation_error");
                assert!(message.starts_with("Tags"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_unauthorized() {
        let body = r#"{"object":"error","status":401,"code":"unauthorized","message":"API token is invalid."}"#;
        assert!(matches!(
            parse_error(StatusCode::UNAUTHORIZED, body),
            NotionError::Unauthorized(m) if m == "API token is invalid."
        ));
    }

    #[test]
    fn test_parse_error_non_json_body() {
        let err = parse_error(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert_eq!(
            err.to_string(),
            "API error: 502 unknown - <html>bad gateway</html>"
        );
    }

    #[test]
    fn test_external_id_filter_is_exact_match() {
        let filter = external_id_filter("42");
        assert_eq!(filter["property"], "Shopify ID");
        assert_eq!(filter["rich_text"]["equals"], "42");
    }

    #[test]
    fn test_keyword_filter_covers_all_fields() {
        let filter = keyword_filter("linen");
        let clauses = filter["or"].as_array().unwrap();
        let properties: Vec<&str> = clauses
            .iter()
            .map(|c| c["property"].as_str().unwrap())
            .collect();
        assert_eq!(
            properties,
            vec!["Name", "Vendor", "Product Type", "Tags", "SKU"]
        );
    }
}
