//! Sync commands.
//!
//! # Usage
//!
//! ```bash
//! storesync sync products
//! storesync sync orders --dry-run
//! ```

use std::io::Write;

use storesync::shopify;
use storesync::{NotionClient, SyncConfig, SyncError, SyncOptions, SyncReport, SyncState};

/// Mirror the product catalog.
pub async fn products(config: &SyncConfig, dry_run: bool) -> Result<(), SyncError> {
    let source = shopify::connect(config)?;
    let store = NotionClient::new(&config.notion, &config.tuning)?;

    tracing::info!(style = %source.style(), dry_run, "Syncing products");
    let report =
        storesync::run_product_sync(source.as_ref(), &store, config, SyncOptions { dry_run })
            .await?;

    print_report(&mut std::io::stdout().lock(), &report)?;
    Ok(())
}

/// Mirror the order history.
pub async fn orders(config: &SyncConfig, dry_run: bool) -> Result<(), SyncError> {
    let source = shopify::connect(config)?;
    let store = NotionClient::new(&config.notion, &config.tuning)?;

    tracing::info!(style = %source.style(), dry_run, "Syncing orders");
    let report =
        storesync::run_order_sync(source.as_ref(), &store, config, SyncOptions { dry_run })
            .await?;

    print_report(&mut std::io::stdout().lock(), &report)?;
    Ok(())
}

fn print_report(out: &mut impl Write, report: &SyncReport) -> std::io::Result<()> {
    let verb = if report.dry_run { "would be " } else { "" };
    writeln!(
        out,
        "Synced {} {}: {} {verb}created, {} {verb}updated, {} failed ({:.1}s)",
        report.total,
        report.kind,
        report.created,
        report.updated,
        report.failed.len(),
        report.elapsed.as_secs_f64(),
    )?;

    if let Some(stats) = &report.order_stats {
        writeln!(
            out,
            "Orders: {} total, {} cancelled, {} refunded, {} first-time, {} returning",
            stats.orders,
            stats.cancelled,
            stats.refunded,
            stats.first_time_customers,
            stats.returning_customers,
        )?;
        writeln!(
            out,
            "Revenue: {} gross, {} net",
            stats.gross_revenue, stats.net_revenue
        )?;
    }

    if report.state == SyncState::PartiallyCompleted {
        writeln!(out, "Failed records:")?;
        for failed in &report.failed {
            writeln!(
                out,
                "  {} ({}): {}",
                failed.external_id, failed.title, failed.error
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use std::time::Duration;

    use storesync::{FailedRecord, SyncKind};

    #[test]
    fn test_print_report_lists_failures() {
        let report = SyncReport {
            kind: SyncKind::Products,
            dry_run: false,
            total: 3,
            created: 1,
            updated: 1,
            failed: vec![FailedRecord {
                external_id: "42".to_string(),
                title: "Linen Shirt".to_string(),
                error: "Notion error: API error: 400 validation_error - bad".to_string(),
            }],
            state: SyncState::PartiallyCompleted,
            elapsed: Duration::from_millis(1500),
            order_stats: None,
        };

        let mut out = Vec::new();
        print_report(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("Synced 3 products: 1 created, 1 updated, 1 failed (1.5s)"));
        assert!(text.contains("  42 (Linen Shirt): Notion error"));
    }

    #[test]
    fn test_print_report_dry_run_wording() {
        let report = SyncReport {
            kind: SyncKind::Orders,
            dry_run: true,
            total: 2,
            created: 2,
            updated: 0,
            failed: vec![],
            state: SyncState::Done,
            elapsed: Duration::ZERO,
            order_stats: None,
        };

        let mut out = Vec::new();
        print_report(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("2 would be created, 0 would be updated"));
    }
}
