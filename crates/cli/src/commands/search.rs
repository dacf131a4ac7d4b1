//! Search command.
//!
//! # Usage
//!
//! ```bash
//! storesync search linen
//! storesync search summer-sale --shopify-only --export
//! storesync search "Acme Co" --notion-only --export acme.json
//! ```

use std::io::Write;
use std::path::PathBuf;

use storesync::search::{SearchHit, default_export_filename, export_results};
use storesync::shopify;
use storesync::{
    NotionClient, SearchAggregator, SearchResults, SearchScope, SyncConfig, SyncError,
};

/// Run a search, print it, and optionally export it.
///
/// `export` is `None` for no export, `Some(None)` for the default file name.
pub async fn run(
    config: &SyncConfig,
    keyword: &str,
    scope: SearchScope,
    export: Option<Option<PathBuf>>,
) -> Result<(), SyncError> {
    let source = shopify::connect(config)?;
    let store = NotionClient::new(&config.notion, &config.tuning)?;

    let results = SearchAggregator::new(source.as_ref(), &store, config)
        .search(keyword, scope)
        .await;

    print_results(&mut std::io::stdout().lock(), &results)?;

    if let Some(path) = export {
        let path = path.unwrap_or_else(|| {
            PathBuf::from(default_export_filename(&results.keyword, results.timestamp))
        });
        export_results(&results, &path)?;
        writeln!(std::io::stdout().lock(), "Exported to {}", path.display())?;
    }
    Ok(())
}

fn print_hits(out: &mut impl Write, heading: &str, hits: &[SearchHit]) -> std::io::Result<()> {
    writeln!(out, "{heading} ({})", hits.len())?;
    for hit in hits {
        let price = hit.price.map_or_else(|| "-".to_string(), |p| format!("{p:.2}"));
        let stock = hit.stock.map_or_else(|| "-".to_string(), |s| format!("{s:.0}"));
        let matched = hit
            .matched_on
            .map_or_else(String::new, |m| format!("{m:?}").to_lowercase());
        writeln!(
            out,
            "  {:<14} {:<40} {:<20} {:>10} {:>6}  {matched}",
            hit.id,
            hit.title,
            hit.vendor.as_deref().unwrap_or("-"),
            price,
            stock,
        )?;
    }
    Ok(())
}

fn print_results(out: &mut impl Write, results: &SearchResults) -> std::io::Result<()> {
    writeln!(out, "Search: \"{}\"", results.keyword)?;

    if results.scope.includes_shopify() {
        print_hits(out, "Shopify", &results.shopify)?;
    }
    if results.scope.includes_notion() {
        print_hits(out, "Notion", &results.notion)?;
    }
    if let Some(collection) = &results.collection {
        print_hits(
            out,
            &format!("Collection {} ({})", collection.title, collection.handle),
            &collection.products,
        )?;
    }
    for error in &results.errors {
        writeln!(out, "Error: {error}")?;
    }

    let summary = &results.summary;
    writeln!(
        out,
        "Total: {} (shopify {}, notion {}, collection {})",
        summary.total, summary.shopify_count, summary.notion_count, summary.collection_count
    )?;
    if let Some(overlap) = summary.overlap {
        writeln!(
            out,
            "In both: {}, Shopify only: {}, Notion only: {}",
            overlap.in_both, overlap.shopify_only, overlap.notion_only
        )?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use chrono::Utc;
    use storesync::search::{HitSource, MatchedOn, Overlap, SearchSummary};

    #[test]
    fn test_print_results_shows_summary_last() {
        let results = SearchResults {
            keyword: "linen".to_string(),
            timestamp: Utc::now(),
            scope: SearchScope::All,
            shopify: vec![SearchHit {
                source: HitSource::Shopify,
                id: "42".to_string(),
                title: "Linen Shirt".to_string(),
                kind: "product",
                vendor: Some("Acme".to_string()),
                product_type: None,
                price: Some(48.0),
                stock: Some(5.0),
                url: None,
                matched_on: Some(MatchedOn::Title),
            }],
            notion: vec![],
            collection: None,
            summary: SearchSummary {
                total: 1,
                shopify_count: 1,
                notion_count: 0,
                collection_count: 0,
                overlap: Some(Overlap {
                    in_both: 0,
                    shopify_only: 1,
                    notion_only: 0,
                }),
            },
            errors: vec![],
        };

        let mut out = Vec::new();
        print_results(&mut out, &results).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Shopify (1)"));
        assert!(text.contains("Notion (0)"));
        assert!(text.contains("48.00"));
        assert!(
            text.trim_end()
                .ends_with("In both: 0, Shopify only: 1, Notion only: 0")
        );
    }
}
