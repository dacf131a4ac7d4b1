//! Product domain types.
//!
//! These are the style-agnostic shapes both source clients convert into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{InventoryItemId, ProductId, VariantId};
use super::status::ProductStatus;

/// A catalog product as read from the source store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// External id (natural key on the target side).
    pub id: ProductId,
    /// URL handle.
    pub handle: String,
    /// Product title.
    pub title: String,
    /// HTML description as stored at the source.
    pub description_html: String,
    /// Vendor name, if set.
    pub vendor: Option<String>,
    /// Product type/category, if set.
    pub product_type: Option<String>,
    /// Raw tags (may contain duplicates and padding).
    pub tags: Vec<String>,
    /// Publication status.
    pub status: ProductStatus,
    /// Variants (at least one for real products).
    pub variants: Vec<Variant>,
    /// Featured image URL.
    pub featured_image: Option<String>,
    /// Collection titles, when the source style reports memberships.
    pub collections: Option<Vec<String>>,
    /// Creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Last update timestamp.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Product {
    /// First variant, whose price represents the product.
    #[must_use]
    pub fn primary_variant(&self) -> Option<&Variant> {
        self.variants.first()
    }

    /// First non-empty SKU across variants.
    #[must_use]
    pub fn primary_sku(&self) -> Option<&str> {
        self.variants
            .iter()
            .filter_map(|v| v.sku.as_deref())
            .map(str::trim)
            .find(|sku| !sku.is_empty())
    }

    /// Sum of available inventory across all variants.
    #[must_use]
    pub fn total_inventory(&self) -> u64 {
        self.variants
            .iter()
            .map(Variant::available_quantity)
            .fold(0, u64::saturating_add)
    }
}

/// A purchasable variant of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Variant id.
    pub id: VariantId,
    /// Variant title (combination of option values).
    pub title: String,
    /// SKU code (optional, not guaranteed unique).
    pub sku: Option<String>,
    /// Price as a decimal string.
    pub price: Option<String>,
    /// Compare-at price as a decimal string. `None` means no sale price.
    pub compare_at_price: Option<String>,
    /// Single reported inventory quantity.
    pub inventory_quantity: Option<i64>,
    /// Inventory item back-reference (for per-location lookups).
    pub inventory_item_id: Option<InventoryItemId>,
    /// `available` quantity at each location, when multi-location data was fetched.
    pub location_available: Option<Vec<i64>>,
}

impl Variant {
    /// Available quantity for this variant.
    ///
    /// Sums per-location `available` quantities when present, otherwise falls
    /// back to the single reported quantity. Negative stock (oversold) counts
    /// as zero.
    #[must_use]
    pub fn available_quantity(&self) -> u64 {
        let raw = self.location_available.as_ref().map_or_else(
            || self.inventory_quantity.unwrap_or(0),
            |levels| levels.iter().copied().fold(0, i64::saturating_add),
        );
        u64::try_from(raw).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(qty: Option<i64>, levels: Option<Vec<i64>>) -> Variant {
        Variant {
            id: VariantId::new("1"),
            title: "Default Title".to_string(),
            sku: None,
            price: Some("10.00".to_string()),
            compare_at_price: None,
            inventory_quantity: qty,
            inventory_item_id: None,
            location_available: levels,
        }
    }

    #[test]
    fn test_location_levels_take_precedence() {
        let v = variant(Some(3), Some(vec![4, 6]));
        assert_eq!(v.available_quantity(), 10);
    }

    #[test]
    fn test_single_quantity_fallback() {
        assert_eq!(variant(Some(7), None).available_quantity(), 7);
        assert_eq!(variant(None, None).available_quantity(), 0);
    }

    #[test]
    fn test_oversold_counts_as_zero() {
        assert_eq!(variant(Some(-2), None).available_quantity(), 0);
    }

    #[test]
    fn test_location_sum_saturates() {
        let v = variant(None, Some(vec![i64::MAX, 1]));
        assert_eq!(v.available_quantity(), i64::MAX.unsigned_abs());

        let oversold = variant(None, Some(vec![i64::MIN, -1, 5]));
        assert_eq!(oversold.available_quantity(), 0);
    }

    #[test]
    fn test_total_inventory_saturates() {
        let huge = variant(None, Some(vec![i64::MAX]));
        let product = Product {
            id: ProductId::new("1"),
            handle: "mug".to_string(),
            title: "Mug".to_string(),
            description_html: String::new(),
            vendor: None,
            product_type: None,
            tags: vec![],
            status: ProductStatus::Active,
            variants: vec![huge.clone(), huge.clone(), huge],
            featured_image: None,
            collections: None,
            created_at: None,
            updated_at: None,
        };
        assert_eq!(product.total_inventory(), u64::MAX);
    }
}
