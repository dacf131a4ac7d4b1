//! Resource-path REST source with `Link` header pagination.

mod types;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue, LINK};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use storesync_core::{Order, Product};
use tracing::instrument;
use url::Url;

use crate::config::{ApiStyle, ShopifyConfig, SyncTuning};
use crate::rate_limit::{Attempt, RetryPolicy, parse_retry_after};

use super::{CatalogSource, CollectionMatch, Page, ShopifyError, fetch_all, truncate_body};
use types::{
    CustomCollectionsEnvelope, InventoryLevelsEnvelope, OrdersEnvelope, ProductsEnvelope,
    RestCollection, RestInventoryLevel, SmartCollectionsEnvelope, apply_levels, group_levels,
};

/// Inventory item ids per `inventory_levels.json` call.
const INVENTORY_BATCH: usize = 50;

/// Shopify Admin API REST source.
///
/// The page cursor is the absolute `next` URL from the previous response's
/// `Link` header, so it is only ever followed, never built.
#[derive(Clone)]
pub struct RestSource {
    inner: Arc<RestSourceInner>,
}

struct RestSourceInner {
    client: reqwest::Client,
    base_url: Url,
    page_size: u32,
    retry: RetryPolicy,
}

impl RestSource {
    /// Create a new REST source.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value, the store
    /// domain does not form a valid URL, or the HTTP client fails to build.
    pub fn new(config: &ShopifyConfig, tuning: &SyncTuning) -> Result<Self, ShopifyError> {
        let mut headers = HeaderMap::new();
        let token = HeaderValue::from_str(config.access_token.expose_secret())
            .map_err(|_| ShopifyError::Unauthorized("Malformed access token".to_string()))?;
        headers.insert("X-Shopify-Access-Token", token);
        headers.insert("Accept", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        let base_url = Url::parse(&format!(
            "https://{}/admin/api/{}/",
            config.store, config.api_version
        ))?;

        Ok(Self {
            inner: Arc::new(RestSourceInner {
                client,
                base_url,
                page_size: tuning.page_size,
                retry: RetryPolicy::from_tuning(tuning),
            }),
        })
    }

    /// Resolve a resource path (e.g. `products.json`) with query pairs.
    fn resource_url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ShopifyError> {
        let mut url = self.inner.base_url.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// First-page URL, or the followed cursor.
    fn page_url(
        &self,
        cursor: Option<String>,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Url, ShopifyError> {
        match cursor {
            Some(next) => Ok(Url::parse(&next)?),
            None => self.resource_url(path, query),
        }
    }

    /// GET a resource, retrying on `429`, returning the body and `next` link.
    async fn get<T: DeserializeOwned + Send>(
        &self,
        url: Url,
    ) -> Result<(T, Option<String>), ShopifyError> {
        let label = url.path().to_string();
        self.inner
            .retry
            .run(&label, || self.get_once(url.clone()))
            .await
    }

    async fn get_once<T: DeserializeOwned + Send>(
        &self,
        url: Url,
    ) -> Result<Attempt<(T, Option<String>)>, ShopifyError> {
        let response = self.inner.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Attempt::RateLimited {
                retry_after: parse_retry_after(response.headers()),
            });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ShopifyError::Unauthorized(
                "Invalid or expired access token".to_string(),
            ));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ShopifyError::Status {
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }

        let next = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_next_link);
        let body = response.text().await?;
        let parsed = serde_json::from_str(&body)?;
        Ok(Attempt::Done((parsed, next)))
    }

    /// Fill in multi-location availability for every variant on the page.
    async fn attach_inventory(&self, products: &mut [Product]) -> Result<(), ShopifyError> {
        let item_ids: Vec<String> = products
            .iter()
            .flat_map(|p| p.variants.iter())
            .filter_map(|v| v.inventory_item_id.as_ref().map(ToString::to_string))
            .collect();

        for batch in item_ids.chunks(INVENTORY_BATCH) {
            let query = [
                ("inventory_item_ids", batch.join(",")),
                ("limit", "250".to_string()),
            ];
            let levels = collect_levels(|cursor| self.levels_page(cursor, &query)).await?;
            apply_levels(products, &levels);
        }
        Ok(())
    }

    /// One page of `inventory_levels.json`; the cursor is the `next` link.
    async fn levels_page(
        &self,
        cursor: Option<String>,
        query: &[(&str, String)],
    ) -> Result<Page<RestInventoryLevel>, ShopifyError> {
        let url = self.page_url(cursor, "inventory_levels.json", query)?;
        let (envelope, next_cursor): (InventoryLevelsEnvelope, _) = self.get(url).await?;
        Ok(Page {
            items: envelope.inventory_levels,
            next_cursor,
        })
    }

    async fn find_collection(&self, handle: &str) -> Result<Option<RestCollection>, ShopifyError> {
        let query = [("handle", handle.to_string())];

        let url = self.resource_url("custom_collections.json", &query)?;
        let (custom, _): (CustomCollectionsEnvelope, _) = self.get(url).await?;
        if let Some(found) = custom.custom_collections.into_iter().find(|c| c.handle == handle) {
            return Ok(Some(found));
        }

        let url = self.resource_url("smart_collections.json", &query)?;
        let (smart, _): (SmartCollectionsEnvelope, _) = self.get(url).await?;
        Ok(smart.smart_collections.into_iter().find(|c| c.handle == handle))
    }
}

/// Follow every page of inventory levels and group them by item id.
///
/// A batch can carry more levels than one page holds, since each item has a
/// level per location.
async fn collect_levels<F, Fut>(fetch_page: F) -> Result<HashMap<String, Vec<i64>>, ShopifyError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<RestInventoryLevel>, ShopifyError>>,
{
    let levels = fetch_all("inventory_levels", fetch_page).await?;
    Ok(group_levels(levels))
}

/// Extract the `rel="next"` target from a `Link` header value.
///
/// The header looks like
/// `<https://shop/admin/api/2024-10/products.json?page_info=abc>; rel="next"`,
/// possibly with a `rel="previous"` entry alongside.
#[must_use]
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';').map(str::trim);
        let target = parts.next()?.strip_prefix('<')?.strip_suffix('>')?;
        parts
            .any(|p| p == r#"rel="next""# || p == "rel=next")
            .then(|| target.to_string())
    })
}

#[async_trait]
impl CatalogSource for RestSource {
    fn style(&self) -> ApiStyle {
        ApiStyle::Rest
    }

    #[instrument(skip(self))]
    async fn product_page(&self, cursor: Option<String>) -> Result<Page<Product>, ShopifyError> {
        let url = self.page_url(
            cursor,
            "products.json",
            &[("limit", self.inner.page_size.to_string())],
        )?;
        let (envelope, next_cursor): (ProductsEnvelope, _) = self.get(url).await?;

        let mut items: Vec<Product> = envelope.products.into_iter().map(Product::from).collect();
        self.attach_inventory(&mut items).await?;

        Ok(Page { items, next_cursor })
    }

    #[instrument(skip(self))]
    async fn order_page(&self, cursor: Option<String>) -> Result<Page<Order>, ShopifyError> {
        let url = self.page_url(
            cursor,
            "orders.json",
            &[
                ("status", "any".to_string()),
                ("limit", self.inner.page_size.to_string()),
            ],
        )?;
        let (envelope, next_cursor): (OrdersEnvelope, _) = self.get(url).await?;

        Ok(Page {
            items: envelope.orders.into_iter().map(Order::from).collect(),
            next_cursor,
        })
    }

    /// REST has no product query language; pages through the catalog and
    /// leaves matching to the caller.
    #[instrument(skip(self))]
    async fn search_products(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<Product>, ShopifyError> {
        tracing::debug!(limit, "REST search scans the full catalog");
        super::fetch_all_products(self).await
    }

    #[instrument(skip(self))]
    async fn collection_by_handle(
        &self,
        handle: &str,
        limit: usize,
    ) -> Result<Option<CollectionMatch>, ShopifyError> {
        let Some(collection) = self.find_collection(handle).await? else {
            return Ok(None);
        };

        let url = self.resource_url(
            &format!("collections/{}/products.json", collection.id),
            &[("limit", limit.clamp(1, 250).to_string())],
        )?;
        let (envelope, _): (ProductsEnvelope, _) = self.get(url).await?;

        Ok(Some(CollectionMatch {
            handle: collection.handle,
            title: collection.title,
            products: envelope.products.into_iter().map(Product::from).collect(),
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use secrecy::SecretString;
    use serde_json::json;

    fn source() -> RestSource {
        let config = ShopifyConfig {
            store: "example.myshopify.com".to_string(),
            api_version: "2024-10".to_string(),
            access_token: SecretString::from("shpat_test_token_value"),
            api_style: ApiStyle::Rest,
        };
        RestSource::new(&config, &SyncTuning::immediate()).unwrap()
    }

    #[test]
    fn test_parse_next_link() {
        let header = r#"<https://example.myshopify.com/admin/api/2024-10/products.json?limit=50&page_info=prev>; rel="previous", <https://example.myshopify.com/admin/api/2024-10/products.json?limit=50&page_info=next>; rel="next""#;
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://example.myshopify.com/admin/api/2024-10/products.json?limit=50&page_info=next")
        );
    }

    #[test]
    fn test_parse_next_link_last_page() {
        let header = r#"<https://example.myshopify.com/admin/api/2024-10/products.json?page_info=prev>; rel="previous""#;
        assert_eq!(parse_next_link(header), None);
        assert_eq!(parse_next_link(""), None);
    }

    #[test]
    fn test_resource_url() {
        let url = source()
            .resource_url("orders.json", &[("status", "any".to_string())])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.myshopify.com/admin/api/2024-10/orders.json?status=any"
        );
    }

    #[tokio::test]
    async fn test_collect_levels_follows_next_links() {
        let pages: Vec<InventoryLevelsEnvelope> = vec![
            serde_json::from_value(json!({ "inventory_levels": [
                { "inventory_item_id": 3, "location_id": 10, "available": 4 },
                { "inventory_item_id": 5, "location_id": 10, "available": 1 }
            ]}))
            .unwrap(),
            serde_json::from_value(json!({ "inventory_levels": [
                { "inventory_item_id": 3, "location_id": 11, "available": 6 }
            ]}))
            .unwrap(),
        ];
        let next = "https://example.myshopify.com/admin/api/2024-10/inventory_levels.json?page_info=2";
        let mut pages = pages.into_iter();
        let mut seen_cursors = Vec::new();

        let levels = collect_levels(|cursor| {
            seen_cursors.push(cursor);
            let envelope = pages.next().unwrap();
            let next_cursor = (!pages.as_slice().is_empty()).then(|| next.to_string());
            async move {
                Ok(Page {
                    items: envelope.inventory_levels,
                    next_cursor,
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(seen_cursors, vec![None, Some(next.to_string())]);
        assert_eq!(levels["3"], vec![4, 6]);
        assert_eq!(levels["5"], vec![1]);
    }

    #[test]
    fn test_page_url_follows_cursor_verbatim() {
        let next = "https://example.myshopify.com/admin/api/2024-10/products.json?page_info=xyz";
        let url = source()
            .page_url(Some(next.to_string()), "products.json", &[])
            .unwrap();
        assert_eq!(url.as_str(), next);
    }
}
