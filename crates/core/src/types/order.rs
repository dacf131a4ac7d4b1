//! Order domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{CustomerId, OrderId};
use super::status::CustomerType;

/// An order as read from the source store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// External id (natural key on the target side).
    pub id: OrderId,
    /// Human-readable order name (e.g. `#1001`).
    pub name: String,
    /// Creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Cancellation timestamp, if cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Ordering customer, if any (POS and draft orders may have none).
    pub customer: Option<CustomerRef>,
    /// Total price at order time, decimal string.
    pub total_price: String,
    /// Current total after refunds and edits, decimal string.
    pub current_total_price: String,
    /// Line items.
    pub line_items: Vec<LineItem>,
    /// Whether any refund exists against the order.
    pub has_refund: bool,
}

impl Order {
    /// Total quantity across line items.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.line_items.iter().map(|li| u64::from(li.quantity)).sum()
    }

    /// Customer classification, when the order has a customer.
    #[must_use]
    pub fn customer_type(&self) -> Option<CustomerType> {
        self.customer
            .as_ref()
            .map(|c| CustomerType::from_order_count(c.orders_count))
    }
}

/// A single order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Quantity ordered.
    pub quantity: u32,
    /// Product title at order time.
    pub title: String,
    /// SKU, if recorded.
    pub sku: Option<String>,
    /// Unit price, decimal string.
    pub unit_price: Option<String>,
}

/// Customer reference attached to an order.
///
/// Used only to classify the order; never mirrored as its own record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRef {
    /// Customer id.
    pub id: CustomerId,
    /// Email address, if known.
    pub email: Option<String>,
    /// Historical order count at the time of the order.
    pub orders_count: u64,
}
