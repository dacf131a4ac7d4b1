//! Fetch-map-upsert runs for products and orders.
//!
//! A run moves `Idle → Fetching → Upserting → Done`. A fetch error ends it
//! in `Failed` and is returned as `Err`; per-record errors are logged,
//! collected in the report, and end the run in `PartiallyCompleted`.
//! Nothing is checkpointed: every run re-reads the whole collection and
//! relies on the external-id key for idempotence.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use storesync_core::{CustomerType, Order, Product, parse_amount};

use crate::config::SyncConfig;
use crate::error::{RecordError, SyncError};
use crate::mapper::{MappingError, order_properties, product_properties};
use crate::notion::{PropertyMap, RecordStore};
use crate::shopify::{CatalogSource, fetch_all_orders, fetch_all_products};
use crate::upsert::{UpsertOutcome, Upserter};

/// Which collection a run mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    Products,
    Orders,
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Products => write!(f, "products"),
            Self::Orders => write!(f, "orders"),
        }
    }
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Fetching,
    Upserting,
    Done,
    PartiallyCompleted,
    Failed,
}

/// Options for a single run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Resolve create vs update but write nothing.
    pub dry_run: bool,
}

/// A record whose upsert failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRecord {
    pub external_id: String,
    pub title: String,
    pub error: String,
}

/// Aggregates over the fetched orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderStats {
    pub orders: usize,
    pub cancelled: usize,
    pub refunded: usize,
    pub first_time_customers: usize,
    pub returning_customers: usize,
    /// Sum of original totals.
    pub gross_revenue: Decimal,
    /// Sum of current totals (after edits and refunds).
    pub net_revenue: Decimal,
}

impl OrderStats {
    #[must_use]
    pub fn from_orders(orders: &[Order]) -> Self {
        let mut stats = Self {
            orders: orders.len(),
            ..Self::default()
        };
        for order in orders {
            if order.cancelled_at.is_some() {
                stats.cancelled += 1;
            }
            if order.has_refund {
                stats.refunded += 1;
            }
            match order.customer_type() {
                Some(CustomerType::FirstTime) => stats.first_time_customers += 1,
                Some(CustomerType::Returning) => stats.returning_customers += 1,
                None => {}
            }
            stats.gross_revenue += parse_amount(&order.total_price).unwrap_or_default();
            stats.net_revenue += parse_amount(&order.current_total_price).unwrap_or_default();
        }
        stats
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub kind: SyncKind,
    pub dry_run: bool,
    /// Records fetched from the source.
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: Vec<FailedRecord>,
    pub state: SyncState,
    pub elapsed: Duration,
    /// Only set for order runs.
    pub order_stats: Option<OrderStats>,
}

impl SyncReport {
    /// Records that were created or updated.
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.created + self.updated
    }
}

/// Tracks state transitions for logging.
struct RunState {
    kind: SyncKind,
    state: SyncState,
}

impl RunState {
    const fn new(kind: SyncKind) -> Self {
        Self {
            kind,
            state: SyncState::Idle,
        }
    }

    fn enter(&mut self, next: SyncState) {
        tracing::debug!(kind = %self.kind, from = ?self.state, to = ?next, "Sync state");
        self.state = next;
    }
}

/// Mirror every product into the products database.
///
/// # Errors
///
/// Returns an error only if the fetch fails; record failures are reported.
pub async fn run_product_sync(
    source: &dyn CatalogSource,
    store: &dyn RecordStore,
    config: &SyncConfig,
    options: SyncOptions,
) -> Result<SyncReport, SyncError> {
    let started = Instant::now();
    let mut run = RunState::new(SyncKind::Products);

    run.enter(SyncState::Fetching);
    let products = match fetch_all_products(source).await {
        Ok(products) => products,
        Err(e) => {
            run.enter(SyncState::Failed);
            tracing::error!(error = %e, style = %source.style(), "Product fetch failed");
            return Err(e.into());
        }
    };

    let upserter = Upserter::new(
        store,
        &config.notion.products_database_id,
        options.dry_run,
    );
    run.enter(SyncState::Upserting);
    let tally = upsert_all(
        &products,
        &upserter,
        config.tuning.progress_interval,
        |p: &Product, synced_at| product_properties(p, &config.shopify, synced_at),
        |p| (p.id.as_str(), p.title.as_str()),
    )
    .await;

    Ok(finish(run, tally, products.len(), options, started, None))
}

/// Mirror every order into the orders database.
///
/// # Errors
///
/// Returns an error only if the fetch fails; record failures are reported.
pub async fn run_order_sync(
    source: &dyn CatalogSource,
    store: &dyn RecordStore,
    config: &SyncConfig,
    options: SyncOptions,
) -> Result<SyncReport, SyncError> {
    let started = Instant::now();
    let mut run = RunState::new(SyncKind::Orders);

    run.enter(SyncState::Fetching);
    let orders = match fetch_all_orders(source).await {
        Ok(orders) => orders,
        Err(e) => {
            run.enter(SyncState::Failed);
            tracing::error!(error = %e, style = %source.style(), "Order fetch failed");
            return Err(e.into());
        }
    };

    let stats = OrderStats::from_orders(&orders);
    tracing::info!(
        orders = stats.orders,
        cancelled = stats.cancelled,
        refunded = stats.refunded,
        first_time = stats.first_time_customers,
        returning = stats.returning_customers,
        gross_revenue = %stats.gross_revenue,
        net_revenue = %stats.net_revenue,
        "Order stats"
    );

    let upserter = Upserter::new(store, &config.notion.orders_database_id, options.dry_run);
    run.enter(SyncState::Upserting);
    let tally = upsert_all(
        &orders,
        &upserter,
        config.tuning.progress_interval,
        |o: &Order, synced_at| order_properties(o, synced_at),
        |o| (o.id.as_str(), o.name.as_str()),
    )
    .await;

    Ok(finish(
        run,
        tally,
        orders.len(),
        options,
        started,
        Some(stats),
    ))
}

#[derive(Default)]
struct Tally {
    created: usize,
    updated: usize,
    failed: Vec<FailedRecord>,
}

/// Upsert records one by one, continuing past per-record failures.
async fn upsert_all<T, M, K>(
    records: &[T],
    upserter: &Upserter<'_>,
    progress_interval: usize,
    map: M,
    key: K,
) -> Tally
where
    M: Fn(&T, DateTime<Utc>) -> Result<PropertyMap, MappingError>,
    K: Fn(&T) -> (&str, &str),
{
    let mut tally = Tally::default();
    let total = records.len();

    for (index, record) in records.iter().enumerate() {
        let (external_id, title) = key(record);

        // Last Synced is the instant this record is written.
        match upsert_one(upserter, external_id, map(record, Utc::now())).await {
            Ok(UpsertOutcome::Created) => tally.created += 1,
            Ok(UpsertOutcome::Updated) => tally.updated += 1,
            Err(e) => {
                tracing::error!(external_id, title, error = %e, "Record failed, continuing");
                tally.failed.push(FailedRecord {
                    external_id: external_id.to_string(),
                    title: title.to_string(),
                    error: e.to_string(),
                });
            }
        }

        let done = index + 1;
        if progress_interval > 0 && (done % progress_interval == 0 || done == total) {
            tracing::info!(done, total, "Progress");
        }
    }

    tally
}

async fn upsert_one(
    upserter: &Upserter<'_>,
    external_id: &str,
    properties: Result<PropertyMap, MappingError>,
) -> Result<UpsertOutcome, RecordError> {
    let properties = properties?;
    Ok(upserter.upsert(external_id, &properties).await?)
}

fn finish(
    mut run: RunState,
    tally: Tally,
    total: usize,
    options: SyncOptions,
    started: Instant,
    order_stats: Option<OrderStats>,
) -> SyncReport {
    run.enter(if tally.failed.is_empty() {
        SyncState::Done
    } else {
        SyncState::PartiallyCompleted
    });

    let report = SyncReport {
        kind: run.kind,
        dry_run: options.dry_run,
        total,
        created: tally.created,
        updated: tally.updated,
        failed: tally.failed,
        state: run.state,
        elapsed: started.elapsed(),
        order_stats,
    };

    tracing::info!(
        kind = %report.kind,
        total = report.total,
        created = report.created,
        updated = report.updated,
        failed = report.failed.len(),
        dry_run = report.dry_run,
        elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
        "Sync finished"
    );
    report
}
