//! Keyword search across the source catalog and the workspace mirror.
//!
//! Three lookups run concurrently: a source product search, a workspace
//! database query, and (when the keyword looks like a collection handle) a
//! collection membership lookup. Hits are normalized to [`SearchHit`] and
//! summarized, including how many external ids appear on both sides.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use storesync_core::{Product, parse_amount_f64};
use tracing::instrument;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::notion::{RecordStore, WorkspaceRecord};
use crate::shopify::CatalogSource;

/// Where a hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HitSource {
    Shopify,
    Notion,
    Collection,
}

impl std::fmt::Display for HitSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Shopify => "shopify",
            Self::Notion => "notion",
            Self::Collection => "collection",
        })
    }
}

/// Field a keyword matched on, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedOn {
    Title,
    Vendor,
    ProductType,
    Tags,
    Sku,
}

/// Searchable fields of a record, from either side.
#[derive(Debug, Default)]
pub struct MatchFields<'a> {
    pub title: &'a str,
    pub vendor: Option<&'a str>,
    pub product_type: Option<&'a str>,
    pub tags: &'a [String],
    /// Every variant SKU; a hit on any of them counts.
    pub skus: Vec<&'a str>,
}

impl<'a> MatchFields<'a> {
    #[must_use]
    pub fn from_product(product: &'a Product) -> Self {
        Self {
            title: &product.title,
            vendor: product.vendor.as_deref(),
            product_type: product.product_type.as_deref(),
            tags: &product.tags,
            skus: product
                .variants
                .iter()
                .filter_map(|v| v.sku.as_deref())
                .filter(|s| !s.trim().is_empty())
                .collect(),
        }
    }

    #[must_use]
    pub fn from_record(record: &'a WorkspaceRecord) -> Self {
        Self {
            title: &record.title,
            vendor: record.vendor.as_deref(),
            product_type: record.product_type.as_deref(),
            tags: &record.tags,
            skus: record.sku.as_deref().into_iter().collect(),
        }
    }

    /// First field matching `keyword`, case-insensitively.
    ///
    /// Text fields match by substring; tags match whole.
    #[must_use]
    pub fn matched_on(&self, keyword: &str) -> Option<MatchedOn> {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        let contains = |field: Option<&str>| {
            field.is_some_and(|value| value.to_lowercase().contains(&needle))
        };

        if contains(Some(self.title)) {
            Some(MatchedOn::Title)
        } else if contains(self.vendor) {
            Some(MatchedOn::Vendor)
        } else if contains(self.product_type) {
            Some(MatchedOn::ProductType)
        } else if self.tags.iter().any(|t| t.trim().to_lowercase() == needle) {
            Some(MatchedOn::Tags)
        } else if self.skus.iter().any(|sku| contains(Some(*sku))) {
            Some(MatchedOn::Sku)
        } else {
            None
        }
    }
}

/// Whether `keyword` could be a collection handle (`[a-z0-9-]+`).
#[must_use]
pub fn is_collection_handle(keyword: &str) -> bool {
    !keyword.is_empty()
        && keyword
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// One normalized search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub source: HitSource,
    /// External id (or page id for workspace pages without one).
    pub id: String,
    pub title: String,
    pub kind: &'static str,
    pub vendor: Option<String>,
    pub product_type: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<f64>,
    pub url: Option<String>,
    pub matched_on: Option<MatchedOn>,
}

impl SearchHit {
    fn from_product(
        product: &Product,
        source: HitSource,
        config: &SyncConfig,
        matched_on: Option<MatchedOn>,
    ) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let stock = product.total_inventory() as f64;
        Self {
            source,
            id: product.id.to_string(),
            title: product.title.clone(),
            kind: "product",
            vendor: product.vendor.clone(),
            product_type: product.product_type.clone(),
            price: parse_amount_f64(
                product
                    .primary_variant()
                    .and_then(|v| v.price.as_deref()),
            ),
            stock: Some(stock),
            url: Some(config.shopify.product_admin_url(product.id.as_str())),
            matched_on,
        }
    }

    fn from_record(record: WorkspaceRecord, matched_on: Option<MatchedOn>) -> Self {
        Self {
            source: HitSource::Notion,
            id: record.external_id.unwrap_or(record.page_id),
            title: record.title,
            kind: "page",
            vendor: record.vendor,
            product_type: record.product_type,
            price: record.price,
            stock: record.inventory,
            url: record.url,
            matched_on,
        }
    }
}

/// Collection lookup result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionHits {
    pub handle: String,
    pub title: String,
    pub products: Vec<SearchHit>,
}

/// External-id overlap between the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Overlap {
    pub in_both: usize,
    pub shopify_only: usize,
    pub notion_only: usize,
}

impl Overlap {
    /// Compare the distinct ids of two hit lists.
    #[must_use]
    pub fn between(shopify: &[SearchHit], notion: &[SearchHit]) -> Self {
        let left: BTreeSet<&str> = shopify.iter().map(|h| h.id.as_str()).collect();
        let right: BTreeSet<&str> = notion.iter().map(|h| h.id.as_str()).collect();
        let in_both = left.intersection(&right).count();
        Self {
            in_both,
            shopify_only: left.len() - in_both,
            notion_only: right.len() - in_both,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchSummary {
    pub total: usize,
    pub shopify_count: usize,
    pub notion_count: usize,
    pub collection_count: usize,
    /// Only computed when both sides were searched.
    pub overlap: Option<Overlap>,
}

/// Which sides to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    #[default]
    All,
    ShopifyOnly,
    NotionOnly,
}

impl SearchScope {
    #[must_use]
    pub const fn includes_shopify(self) -> bool {
        matches!(self, Self::All | Self::ShopifyOnly)
    }

    #[must_use]
    pub const fn includes_notion(self) -> bool {
        matches!(self, Self::All | Self::NotionOnly)
    }
}

/// Everything a search produced.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub keyword: String,
    pub timestamp: DateTime<Utc>,
    pub scope: SearchScope,
    pub shopify: Vec<SearchHit>,
    pub notion: Vec<SearchHit>,
    pub collection: Option<CollectionHits>,
    pub summary: SearchSummary,
    /// Per-side failures; the other sides still report.
    pub errors: Vec<String>,
}

impl SearchResults {
    fn summarize(&mut self) {
        let collection_count = self.collection.as_ref().map_or(0, |c| c.products.len());
        self.summary = SearchSummary {
            total: self.shopify.len() + self.notion.len() + collection_count,
            shopify_count: self.shopify.len(),
            notion_count: self.notion.len(),
            collection_count,
            overlap: (self.scope == SearchScope::All)
                .then(|| Overlap::between(&self.shopify, &self.notion)),
        };
    }
}

/// Runs keyword searches against both systems.
pub struct SearchAggregator<'a> {
    source: &'a dyn CatalogSource,
    store: &'a dyn RecordStore,
    config: &'a SyncConfig,
}

impl<'a> SearchAggregator<'a> {
    #[must_use]
    pub const fn new(
        source: &'a dyn CatalogSource,
        store: &'a dyn RecordStore,
        config: &'a SyncConfig,
    ) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    /// Search for `keyword` in the requested scope.
    ///
    /// A failing side is logged and recorded in `errors`; it never hides the
    /// results of the others.
    #[instrument(skip(self))]
    pub async fn search(&self, keyword: &str, scope: SearchScope) -> SearchResults {
        let keyword = keyword.trim();
        let limit = self.config.tuning.search_limit;

        let shopify = async {
            if scope.includes_shopify() {
                self.search_shopify(keyword, limit).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let notion = async {
            if scope.includes_notion() {
                self.search_notion(keyword, limit).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let collection = async {
            if scope.includes_shopify() && is_collection_handle(keyword) {
                self.search_collection(keyword, limit).await
            } else {
                Ok(None)
            }
        };

        let (shopify, notion, collection) = tokio::join!(shopify, notion, collection);

        let mut errors = Vec::new();
        let mut record = |side: &str, e: &SyncError| {
            tracing::warn!(side, error = %e, "Search side failed");
            errors.push(format!("{side}: {e}"));
        };

        let shopify = shopify.unwrap_or_else(|e| {
            record("shopify", &e);
            None
        });
        let notion = notion.unwrap_or_else(|e| {
            record("notion", &e);
            None
        });
        let collection = collection.unwrap_or_else(|e| {
            record("collection", &e);
            None
        });

        let mut results = SearchResults {
            keyword: keyword.to_string(),
            timestamp: Utc::now(),
            scope,
            shopify: shopify.unwrap_or_default(),
            notion: notion.unwrap_or_default(),
            collection,
            summary: SearchSummary {
                total: 0,
                shopify_count: 0,
                notion_count: 0,
                collection_count: 0,
                overlap: None,
            },
            errors,
        };
        results.summarize();

        tracing::info!(
            total = results.summary.total,
            shopify = results.summary.shopify_count,
            notion = results.summary.notion_count,
            collection = results.summary.collection_count,
            "Search complete"
        );
        results
    }

    async fn search_shopify(&self, keyword: &str, limit: usize) -> Result<Vec<SearchHit>, SyncError> {
        let products = self.source.search_products(keyword, limit).await?;
        Ok(products
            .iter()
            .filter_map(|p| {
                MatchFields::from_product(p)
                    .matched_on(keyword)
                    .map(|m| SearchHit::from_product(p, HitSource::Shopify, self.config, Some(m)))
            })
            .take(limit)
            .collect())
    }

    async fn search_notion(&self, keyword: &str, limit: usize) -> Result<Vec<SearchHit>, SyncError> {
        let records = self
            .store
            .search(&self.config.notion.products_database_id, keyword, limit)
            .await?;
        Ok(records
            .into_iter()
            .take(limit)
            .map(|r| {
                let matched = MatchFields::from_record(&r).matched_on(keyword);
                SearchHit::from_record(r, matched)
            })
            .collect())
    }

    async fn search_collection(
        &self,
        handle: &str,
        limit: usize,
    ) -> Result<Option<CollectionHits>, SyncError> {
        let Some(found) = self.source.collection_by_handle(handle, limit).await? else {
            return Ok(None);
        };
        Ok(Some(CollectionHits {
            handle: found.handle,
            title: found.title,
            products: found
                .products
                .iter()
                .take(limit)
                .map(|p| SearchHit::from_product(p, HitSource::Collection, self.config, None))
                .collect(),
        }))
    }
}

/// `search_{slug}_{YYYYMMDD_HHMMSS}.json`
#[must_use]
pub fn default_export_filename(keyword: &str, at: DateTime<Utc>) -> String {
    let mut slug = String::new();
    for c in keyword.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    let slug = if slug.is_empty() { "query" } else { slug };
    format!("search_{slug}_{}.json", at.format("%Y%m%d_%H%M%S"))
}

/// Write results as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if encoding or writing fails.
pub fn export_results(results: &SearchResults, path: &Path) -> Result<(), SyncError> {
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(path, json)?;
    tracing::info!(path = %path.display(), "Exported search results");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn hit(id: &str, source: HitSource) -> SearchHit {
        SearchHit {
            source,
            id: id.to_string(),
            title: id.to_string(),
            kind: "product",
            vendor: None,
            product_type: None,
            price: None,
            stock: None,
            url: None,
            matched_on: None,
        }
    }

    #[test]
    fn test_overlap_counts() {
        let shopify: Vec<_> = ["A", "B", "C"]
            .iter()
            .map(|id| hit(id, HitSource::Shopify))
            .collect();
        let notion: Vec<_> = ["B", "C", "D"]
            .iter()
            .map(|id| hit(id, HitSource::Notion))
            .collect();

        assert_eq!(
            Overlap::between(&shopify, &notion),
            Overlap {
                in_both: 2,
                shopify_only: 1,
                notion_only: 1,
            }
        );
    }

    #[test]
    fn test_overlap_counts_distinct_ids() {
        let shopify = vec![hit("A", HitSource::Shopify), hit("A", HitSource::Shopify)];
        let overlap = Overlap::between(&shopify, &[]);
        assert_eq!(overlap.shopify_only, 1);
    }

    #[test]
    fn test_is_collection_handle() {
        assert!(is_collection_handle("summer-sale"));
        assert!(is_collection_handle("2024-drop"));
        assert!(!is_collection_handle("Summer Sale!"));
        assert!(!is_collection_handle("summer sale"));
        assert!(!is_collection_handle(""));
    }

    #[test]
    fn test_matched_on_priority() {
        let tags = vec!["linen".to_string()];
        let fields = MatchFields {
            title: "Linen Shirt",
            vendor: Some("Linen Co"),
            product_type: None,
            tags: &tags,
            skus: vec!["LINEN-1"],
        };
        assert_eq!(fields.matched_on("linen"), Some(MatchedOn::Title));

        let fields = MatchFields {
            title: "Shirt",
            vendor: Some("Linen Co"),
            product_type: None,
            tags: &tags,
            skus: vec![],
        };
        assert_eq!(fields.matched_on("LINEN"), Some(MatchedOn::Vendor));

        let fields = MatchFields {
            title: "Shirt",
            tags: &tags,
            skus: vec!["SH-1"],
            ..MatchFields::default()
        };
        assert_eq!(fields.matched_on("linen"), Some(MatchedOn::Tags));
        assert_eq!(fields.matched_on("sh-1"), Some(MatchedOn::Sku));
        assert_eq!(fields.matched_on("wool"), None);
    }

    #[test]
    fn test_sku_on_any_variant_matches() {
        use storesync_core::{ProductId, ProductStatus, Variant, VariantId};

        let variant = |id: &str, sku: &str| Variant {
            id: VariantId::new(id),
            title: sku.to_string(),
            sku: Some(sku.to_string()),
            price: Some("20.00".to_string()),
            compare_at_price: None,
            inventory_quantity: Some(1),
            inventory_item_id: None,
            location_available: None,
        };
        let product = Product {
            id: ProductId::new("201"),
            handle: "plain-shirt".to_string(),
            title: "Plain Shirt".to_string(),
            description_html: String::new(),
            vendor: None,
            product_type: None,
            tags: vec![],
            status: ProductStatus::Active,
            variants: vec![variant("1", "SKU-201"), variant("2", "LINEN-9")],
            featured_image: None,
            collections: None,
            created_at: None,
            updated_at: None,
        };

        let fields = MatchFields::from_product(&product);
        assert_eq!(fields.matched_on("linen-9"), Some(MatchedOn::Sku));
        assert_eq!(fields.matched_on("sku-201"), Some(MatchedOn::Sku));
    }

    #[test]
    fn test_tags_match_whole_values() {
        let tags = vec!["summer-sale".to_string()];
        let fields = MatchFields {
            title: "Hat",
            tags: &tags,
            ..MatchFields::default()
        };
        assert_eq!(fields.matched_on("summer"), None);
        assert_eq!(fields.matched_on("Summer-Sale"), Some(MatchedOn::Tags));
    }

    #[test]
    fn test_default_export_filename() {
        let at = DateTime::parse_from_rfc3339("2024-06-01T09:08:07Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            default_export_filename("Summer Sale!", at),
            "search_summer_sale_20240601_090807.json"
        );
        assert_eq!(
            default_export_filename("???", at),
            "search_query_20240601_090807.json"
        );
    }

    #[test]
    fn test_summary_skips_overlap_for_single_side() {
        let mut results = SearchResults {
            keyword: "x".to_string(),
            timestamp: Utc::now(),
            scope: SearchScope::ShopifyOnly,
            shopify: vec![hit("A", HitSource::Shopify)],
            notion: vec![],
            collection: Some(CollectionHits {
                handle: "x".to_string(),
                title: "X".to_string(),
                products: vec![hit("A", HitSource::Collection)],
            }),
            summary: SearchSummary {
                total: 0,
                shopify_count: 0,
                notion_count: 0,
                collection_count: 0,
                overlap: None,
            },
            errors: vec![],
        };
        results.summarize();
        assert_eq!(results.summary.total, 2);
        assert_eq!(results.summary.collection_count, 1);
        assert_eq!(results.summary.overlap, None);
    }
}
