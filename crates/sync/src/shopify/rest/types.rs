//! REST resource payloads and their conversion to core types.

use std::collections::HashMap;

use serde::Deserialize;
use storesync_core::{
    CustomerId, CustomerRef, InventoryItemId, LineItem, Order, OrderId, Product, ProductId,
    ProductStatus, Variant, VariantId,
};

use super::super::{non_empty, parse_timestamp};

#[derive(Debug, Deserialize)]
pub struct ProductsEnvelope {
    pub products: Vec<RestProduct>,
}

#[derive(Debug, Deserialize)]
pub struct OrdersEnvelope {
    pub orders: Vec<RestOrder>,
}

#[derive(Debug, Deserialize)]
pub struct InventoryLevelsEnvelope {
    pub inventory_levels: Vec<RestInventoryLevel>,
}

#[derive(Debug, Deserialize)]
pub struct CustomCollectionsEnvelope {
    pub custom_collections: Vec<RestCollection>,
}

#[derive(Debug, Deserialize)]
pub struct SmartCollectionsEnvelope {
    pub smart_collections: Vec<RestCollection>,
}

#[derive(Debug, Deserialize)]
pub struct RestCollection {
    pub id: u64,
    pub handle: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct RestProduct {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub handle: String,
    pub body_html: Option<String>,
    pub vendor: Option<String>,
    pub product_type: Option<String>,
    /// Comma-joined.
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub status: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(default)]
    pub variants: Vec<RestVariant>,
    pub image: Option<RestImage>,
}

#[derive(Debug, Deserialize)]
pub struct RestImage {
    pub src: String,
}

#[derive(Debug, Deserialize)]
pub struct RestVariant {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    pub sku: Option<String>,
    pub price: Option<String>,
    pub compare_at_price: Option<String>,
    pub inventory_quantity: Option<i64>,
    pub inventory_item_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RestInventoryLevel {
    pub inventory_item_id: u64,
    pub available: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RestOrder {
    pub id: u64,
    pub name: String,
    pub created_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub customer: Option<RestCustomer>,
    pub email: Option<String>,
    #[serde(default)]
    pub total_price: String,
    #[serde(default)]
    pub current_total_price: String,
    #[serde(default)]
    pub line_items: Vec<RestLineItem>,
    #[serde(default)]
    pub refunds: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct RestCustomer {
    pub id: u64,
    pub email: Option<String>,
    #[serde(default)]
    pub orders_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct RestLineItem {
    pub quantity: u32,
    pub title: String,
    pub sku: Option<String>,
    pub price: Option<String>,
}

/// Split a comma-joined tag string.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

impl From<RestProduct> for Product {
    fn from(p: RestProduct) -> Self {
        Self {
            id: ProductId::new(p.id.to_string()),
            handle: p.handle,
            title: p.title,
            description_html: p.body_html.unwrap_or_default(),
            vendor: non_empty(p.vendor),
            product_type: non_empty(p.product_type),
            tags: split_tags(&p.tags),
            status: ProductStatus::parse(&p.status),
            featured_image: p.image.map(|i| i.src),
            collections: None,
            created_at: parse_timestamp(p.created_at.as_deref()),
            updated_at: parse_timestamp(p.updated_at.as_deref()),
            variants: p.variants.into_iter().map(Variant::from).collect(),
        }
    }
}

impl From<RestVariant> for Variant {
    fn from(v: RestVariant) -> Self {
        Self {
            id: VariantId::new(v.id.to_string()),
            title: v.title,
            sku: non_empty(v.sku),
            price: non_empty(v.price),
            compare_at_price: non_empty(v.compare_at_price),
            inventory_quantity: v.inventory_quantity,
            inventory_item_id: v.inventory_item_id.map(|id| InventoryItemId::new(id.to_string())),
            location_available: None,
        }
    }
}

impl From<RestOrder> for Order {
    fn from(o: RestOrder) -> Self {
        let order_email = non_empty(o.email);
        Self {
            id: OrderId::new(o.id.to_string()),
            name: o.name,
            created_at: parse_timestamp(o.created_at.as_deref()),
            cancelled_at: parse_timestamp(o.cancelled_at.as_deref()),
            customer: o.customer.map(|c| CustomerRef {
                id: CustomerId::new(c.id.to_string()),
                email: non_empty(c.email).or(order_email),
                orders_count: c.orders_count,
            }),
            total_price: o.total_price,
            current_total_price: o.current_total_price,
            has_refund: !o.refunds.is_empty(),
            line_items: o
                .line_items
                .into_iter()
                .map(|li| LineItem {
                    quantity: li.quantity,
                    title: li.title,
                    sku: non_empty(li.sku),
                    unit_price: non_empty(li.price),
                })
                .collect(),
        }
    }
}

/// Group per-location `available` values by inventory item id.
pub fn group_levels(levels: Vec<RestInventoryLevel>) -> HashMap<String, Vec<i64>> {
    let mut grouped: HashMap<String, Vec<i64>> = HashMap::new();
    for level in levels {
        grouped
            .entry(level.inventory_item_id.to_string())
            .or_default()
            .push(level.available.unwrap_or(0));
    }
    grouped
}

/// Attach grouped inventory levels to every variant that has some.
pub fn apply_levels(products: &mut [Product], levels: &HashMap<String, Vec<i64>>) {
    for variant in products.iter_mut().flat_map(|p| p.variants.iter_mut()) {
        if let Some(found) = variant
            .inventory_item_id
            .as_ref()
            .and_then(|id| levels.get(id.as_str()))
        {
            variant.location_available = Some(found.clone());
        }
    }
}
