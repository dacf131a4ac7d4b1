//! In-memory fakes for storesync integration tests.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p storesync-integration-tests
//! ```
//!
//! No network access is needed: [`FakeSource`] stands in for the Shopify
//! store and [`MemoryStore`] for the Notion workspace. Both are driven
//! through the same traits the real clients implement.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use storesync::config::{ApiStyle, SyncTuning};
use storesync::notion::{
    EXTERNAL_ID_PROPERTY, NotionError, PropertyMap, PropertyValue, RecordStore, TITLE_PROPERTY,
    WorkspaceRecord,
};
use storesync::search::MatchFields;
use storesync::shopify::{CatalogSource, CollectionMatch, Page, ShopifyError};
use storesync::SyncConfig;
use storesync_core::{
    CustomerId, CustomerRef, LineItem, Order, OrderId, Product, ProductId, ProductStatus, Variant,
    VariantId,
};

// =============================================================================
// Fixtures
// =============================================================================

/// Config with test credentials and zero delays.
#[must_use]
pub fn test_config() -> SyncConfig {
    let vars: HashMap<String, String> = [
        ("SHOPIFY_STORE", "storesync-test"),
        ("SHOPIFY_ACCESS_TOKEN", "shpat_9f8Kd2mQ7xLp4Zr1Vb6Nc3Ty"),
        ("NOTION_API_KEY", "ntn_4Hs8Jq2Lw9Xe5Rt7Yu1Io3Pa"),
        ("NOTION_DATABASE_ID", "products-db"),
        ("NOTION_ORDERS_DATABASE_ID", "orders-db"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let mut config = SyncConfig::from_map(&vars).unwrap();
    config.tuning = SyncTuning::immediate();
    config
}

/// A single-variant product.
#[must_use]
pub fn product(id: &str, title: &str, price: &str) -> Product {
    Product {
        id: ProductId::new(format!("gid://shopify/Product/{id}")),
        handle: title.to_lowercase().replace(' ', "-"),
        title: title.to_string(),
        description_html: format!("<p>{title}</p>"),
        vendor: Some("Acme".to_string()),
        product_type: Some("Apparel".to_string()),
        tags: vec!["cotton".to_string()],
        status: ProductStatus::Active,
        variants: vec![Variant {
            id: VariantId::new(format!("{id}01")),
            title: "Default Title".to_string(),
            sku: Some(format!("SKU-{id}")),
            price: Some(price.to_string()),
            compare_at_price: None,
            inventory_quantity: Some(5),
            inventory_item_id: None,
            location_available: None,
        }],
        featured_image: None,
        collections: Some(vec![]),
        created_at: None,
        updated_at: None,
    }
}

/// An order with one line and a customer.
#[must_use]
pub fn order(id: &str, total: &str, customer_orders: u64) -> Order {
    Order {
        id: OrderId::new(format!("gid://shopify/Order/{id}")),
        name: format!("#{id}"),
        created_at: None,
        cancelled_at: None,
        customer: Some(CustomerRef {
            id: CustomerId::new("900"),
            email: Some("buyer@example.com".to_string()),
            orders_count: customer_orders,
        }),
        total_price: total.to_string(),
        current_total_price: total.to_string(),
        line_items: vec![LineItem {
            quantity: 1,
            title: "Tee".to_string(),
            sku: None,
            unit_price: Some(total.to_string()),
        }],
        has_refund: false,
    }
}

// =============================================================================
// Fake source
// =============================================================================

/// Serves fixed products and orders in pages of `page_size`.
pub struct FakeSource {
    pub products: Vec<Product>,
    pub orders: Vec<Order>,
    pub collections: HashMap<String, CollectionMatch>,
    pub page_size: usize,
    /// Page index (0-based) at which product fetching fails.
    pub fail_product_page: Option<usize>,
    pub page_requests: AtomicUsize,
}

impl FakeSource {
    #[must_use]
    pub fn new(products: Vec<Product>, orders: Vec<Order>) -> Self {
        Self {
            products,
            orders,
            collections: HashMap::new(),
            page_size: 2,
            fail_product_page: None,
            page_requests: AtomicUsize::new(0),
        }
    }

    fn page<T: Clone>(&self, items: &[T], cursor: Option<String>) -> Page<T> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        let start: usize = cursor.map_or(0, |c| c.parse().unwrap());
        let end = (start + self.page_size).min(items.len());
        Page {
            items: items.get(start..end).unwrap_or_default().to_vec(),
            next_cursor: (end < items.len()).then(|| end.to_string()),
        }
    }
}

#[async_trait]
impl CatalogSource for FakeSource {
    fn style(&self) -> ApiStyle {
        ApiStyle::GraphQl
    }

    async fn product_page(&self, cursor: Option<String>) -> Result<Page<Product>, ShopifyError> {
        let index = cursor.as_ref().map_or(0, |c| c.parse::<usize>().unwrap()) / self.page_size;
        if self.fail_product_page == Some(index) {
            return Err(ShopifyError::Status {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        Ok(self.page(&self.products, cursor))
    }

    async fn order_page(&self, cursor: Option<String>) -> Result<Page<Order>, ShopifyError> {
        Ok(self.page(&self.orders, cursor))
    }

    async fn search_products(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<Product>, ShopifyError> {
        Ok(self
            .products
            .iter()
            .filter(|p| source_matches(p, keyword))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn collection_by_handle(
        &self,
        handle: &str,
        _limit: usize,
    ) -> Result<Option<CollectionMatch>, ShopifyError> {
        Ok(self.collections.get(handle).cloned())
    }
}

/// Server-side keyword filter: substring on title, vendor, type and any
/// variant SKU, whole value on tags.
fn source_matches(product: &Product, keyword: &str) -> bool {
    let needle = keyword.trim().to_lowercase();
    let contains = |value: &str| value.to_lowercase().contains(&needle);

    contains(&product.title)
        || product.vendor.as_deref().is_some_and(contains)
        || product.product_type.as_deref().is_some_and(contains)
        || product.tags.iter().any(|t| t.to_lowercase() == needle)
        || product
            .variants
            .iter()
            .filter_map(|v| v.sku.as_deref())
            .any(contains)
}

// =============================================================================
// In-memory record store
// =============================================================================

/// A stored page.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub database_id: String,
    pub properties: PropertyMap,
}

impl StoredRecord {
    #[must_use]
    pub fn external_id(&self) -> Option<&str> {
        text_of(&self.properties, EXTERNAL_ID_PROPERTY)
    }
}

fn text_of<'a>(props: &'a PropertyMap, name: &str) -> Option<&'a str> {
    match props.get(name) {
        Some(PropertyValue::RichText(s) | PropertyValue::Title(s)) if !s.is_empty() => {
            Some(s.as_str())
        }
        _ => None,
    }
}

fn select_of(props: &PropertyMap, name: &str) -> Option<String> {
    match props.get(name) {
        Some(PropertyValue::Select(s)) => s.clone(),
        _ => None,
    }
}

fn number_of(props: &PropertyMap, name: &str) -> Option<f64> {
    match props.get(name) {
        Some(PropertyValue::Number(n)) => *n,
        _ => None,
    }
}

/// Notion stand-in keeping pages in a map, with failure injection.
#[derive(Default)]
pub struct MemoryStore {
    pages: Mutex<HashMap<String, StoredRecord>>,
    next_id: AtomicUsize,
    /// External ids whose writes are rejected.
    pub reject_writes_for: HashSet<String>,
    /// Fail every search with an auth error.
    pub fail_search: bool,
    /// Simulated round trip for each create or update.
    pub write_latency: Duration,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes for the given external ids.
    #[must_use]
    pub fn rejecting(ids: &[&str]) -> Self {
        Self {
            reject_writes_for: ids.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    /// Wait `latency` inside every create and update.
    #[must_use]
    pub fn with_write_latency(latency: Duration) -> Self {
        Self {
            write_latency: latency,
            ..Self::default()
        }
    }

    /// Records in `database_id`.
    #[must_use]
    pub fn records(&self, database_id: &str) -> Vec<StoredRecord> {
        self.pages
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.database_id == database_id)
            .cloned()
            .collect()
    }

    /// The record with `external_id`, if any.
    #[must_use]
    pub fn find(&self, database_id: &str, external_id: &str) -> Option<StoredRecord> {
        self.records(database_id)
            .into_iter()
            .find(|r| r.external_id() == Some(external_id))
    }

    /// Insert a record directly (workspace-only data).
    pub fn seed(&self, database_id: &str, properties: PropertyMap) -> String {
        let page_id = format!("page-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.pages.lock().unwrap().insert(
            page_id.clone(),
            StoredRecord {
                database_id: database_id.to_string(),
                properties,
            },
        );
        page_id
    }

    async fn simulate_latency(&self) {
        if !self.write_latency.is_zero() {
            tokio::time::sleep(self.write_latency).await;
        }
    }

    fn check_writable(&self, properties: &PropertyMap) -> Result<(), NotionError> {
        match text_of(properties, EXTERNAL_ID_PROPERTY) {
            Some(id) if self.reject_writes_for.contains(id) => Err(NotionError::Api {
                status: 400,
                code: "validation_error".to_string(),
                message: format!("rejected {id}"),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_by_external_id(
        &self,
        database_id: &str,
        external_id: &str,
    ) -> Result<Option<String>, NotionError> {
        Ok(self
            .pages
            .lock()
            .unwrap()
            .iter()
            .find(|(_, r)| r.database_id == database_id && r.external_id() == Some(external_id))
            .map(|(id, _)| id.clone()))
    }

    async fn create_record(
        &self,
        database_id: &str,
        properties: &PropertyMap,
    ) -> Result<String, NotionError> {
        self.simulate_latency().await;
        self.check_writable(properties)?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(self.seed(database_id, properties.clone()))
    }

    async fn update_record(
        &self,
        page_id: &str,
        properties: &PropertyMap,
    ) -> Result<(), NotionError> {
        self.simulate_latency().await;
        self.check_writable(properties)?;
        let mut pages = self.pages.lock().unwrap();
        let record = pages.get_mut(page_id).ok_or_else(|| NotionError::Api {
            status: 404,
            code: "object_not_found".to_string(),
            message: page_id.to_string(),
        })?;
        record.properties.extend(properties.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn search(
        &self,
        database_id: &str,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<WorkspaceRecord>, NotionError> {
        if self.fail_search {
            return Err(NotionError::Unauthorized("invalid token".to_string()));
        }
        let pages = self.pages.lock().unwrap();
        let mut found: Vec<WorkspaceRecord> = pages
            .iter()
            .filter(|(_, r)| r.database_id == database_id)
            .map(|(page_id, r)| to_workspace_record(page_id, &r.properties))
            .filter(|w| MatchFields::from_record(w).matched_on(keyword).is_some())
            .collect();
        found.sort_by(|a, b| a.page_id.cmp(&b.page_id));
        found.truncate(limit);
        Ok(found)
    }
}

fn to_workspace_record(page_id: &str, props: &PropertyMap) -> WorkspaceRecord {
    WorkspaceRecord {
        page_id: page_id.to_string(),
        url: Some(format!("https://www.notion.so/{page_id}")),
        external_id: text_of(props, EXTERNAL_ID_PROPERTY).map(String::from),
        title: text_of(props, TITLE_PROPERTY).unwrap_or_default().to_string(),
        vendor: select_of(props, "Vendor"),
        product_type: select_of(props, "Product Type"),
        tags: match props.get("Tags") {
            Some(PropertyValue::MultiSelect(tags)) => tags.clone(),
            _ => vec![],
        },
        sku: text_of(props, "SKU").map(String::from),
        price: number_of(props, "Price"),
        inventory: number_of(props, "Inventory"),
    }
}
