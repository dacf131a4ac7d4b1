//! Conversions from GraphQL response shapes to core types.

use storesync_core::{
    CustomerId, CustomerRef, InventoryItemId, LineItem, Order, OrderId, Product, ProductId,
    ProductStatus, Variant, VariantId,
};

use super::super::{non_empty, parse_timestamp};
use super::queries::{OrderNode, ProductNode, VariantNode};

pub fn convert_product(node: ProductNode) -> Product {
    Product {
        id: ProductId::new(&node.id),
        handle: node.handle,
        title: node.title,
        description_html: node.description_html.unwrap_or_default(),
        vendor: non_empty(node.vendor),
        product_type: non_empty(node.product_type),
        tags: node.tags,
        status: ProductStatus::parse(&node.status),
        featured_image: node.featured_image.map(|i| i.url),
        collections: node
            .collections
            .map(|c| c.into_nodes().map(|n| n.title).collect()),
        created_at: parse_timestamp(node.created_at.as_deref()),
        updated_at: parse_timestamp(node.updated_at.as_deref()),
        variants: node.variants.into_nodes().map(convert_variant).collect(),
    }
}

fn convert_variant(node: VariantNode) -> Variant {
    let (inventory_item_id, location_available) = match node.inventory_item {
        Some(item) => {
            let levels = item.inventory_levels.map(|levels| {
                levels
                    .into_nodes()
                    .map(|level| {
                        level
                            .quantities
                            .iter()
                            .filter(|q| q.name == "available")
                            .map(|q| q.quantity)
                            .sum::<i64>()
                    })
                    .collect::<Vec<_>>()
            });
            // An item stocked nowhere reports no levels; fall back to the
            // single quantity rather than claiming zero.
            let levels = levels.filter(|l| !l.is_empty());
            (Some(InventoryItemId::new(&item.id)), levels)
        }
        None => (None, None),
    };

    Variant {
        id: VariantId::new(&node.id),
        title: node.title,
        sku: non_empty(node.sku),
        price: non_empty(node.price),
        compare_at_price: non_empty(node.compare_at_price),
        inventory_quantity: node.inventory_quantity,
        inventory_item_id,
        location_available,
    }
}

pub fn convert_order(node: OrderNode) -> Order {
    Order {
        id: OrderId::new(&node.id),
        name: node.name,
        created_at: parse_timestamp(node.created_at.as_deref()),
        cancelled_at: parse_timestamp(node.cancelled_at.as_deref()),
        customer: node.customer.map(|c| CustomerRef {
            id: CustomerId::new(&c.id),
            email: non_empty(c.email),
            orders_count: c.number_of_orders,
        }),
        total_price: node.total_price_set.shop_money.amount,
        current_total_price: node.current_total_price_set.shop_money.amount,
        has_refund: !node.refunds.is_empty(),
        line_items: node
            .line_items
            .into_nodes()
            .map(|li| LineItem {
                quantity: li.quantity,
                title: li.title,
                sku: non_empty(li.sku),
                unit_price: li.original_unit_price_set.map(|m| m.shop_money.amount),
            })
            .collect(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use serde_json::json;

    fn product_json() -> serde_json::Value {
        json!({
            "id": "gid://shopify/Product/42",
            "handle": "linen-shirt",
            "title": "Linen Shirt",
            "descriptionHtml": "<p>Breathable</p>",
            "vendor": "",
            "productType": "Shirts",
            "tags": ["summer", "linen"],
            "status": "ACTIVE",
            "createdAt": "2024-01-02T03:04:05Z",
            "updatedAt": "2024-02-02T03:04:05Z",
            "featuredImage": { "url": "https://cdn.shopify.com/shirt.jpg" },
            "collections": { "edges": [{ "node": { "title": "Summer" } }] },
            "variants": {
                "edges": [{
                    "node": {
                        "id": "gid://shopify/ProductVariant/7",
                        "title": "M",
                        "sku": "LS-M",
                        "price": "48.00",
                        "compareAtPrice": null,
                        "inventoryQuantity": 3,
                        "inventoryItem": {
                            "id": "gid://shopify/InventoryItem/99",
                            "inventoryLevels": { "edges": [
                                { "node": { "quantities": [{ "name": "available", "quantity": 4 }] } },
                                { "node": { "quantities": [{ "name": "available", "quantity": 5 }] } }
                            ] }
                        }
                    }
                }]
            }
        })
    }

    #[test]
    fn test_convert_product() {
        let node: ProductNode = serde_json::from_value(product_json()).unwrap();
        let product = convert_product(node);

        assert_eq!(product.id.as_str(), "42");
        assert_eq!(product.vendor, None);
        assert_eq!(product.product_type.as_deref(), Some("Shirts"));
        assert_eq!(product.status, ProductStatus::Active);
        assert_eq!(product.collections, Some(vec!["Summer".to_string()]));

        let variant = product.variants.first().unwrap();
        assert_eq!(variant.compare_at_price, None);
        assert_eq!(variant.location_available, Some(vec![4, 5]));
        assert_eq!(variant.available_quantity(), 9);
        assert_eq!(
            variant.inventory_item_id.as_ref().map(InventoryItemId::as_str),
            Some("99")
        );
    }

    #[test]
    fn test_convert_order() {
        let node: OrderNode = serde_json::from_value(json!({
            "id": "gid://shopify/Order/1001",
            "name": "#1001",
            "createdAt": "2024-05-01T12:00:00Z",
            "cancelledAt": null,
            "customer": { "id": "gid://shopify/Customer/5", "email": "a@b.co", "numberOfOrders": "1" },
            "totalPriceSet": { "shopMoney": { "amount": "60.0" } },
            "currentTotalPriceSet": { "shopMoney": { "amount": "40.0" } },
            "refunds": [{ "id": "gid://shopify/Refund/3" }],
            "lineItems": { "edges": [
                { "node": { "quantity": 2, "title": "Linen Shirt", "sku": "LS-M",
                            "originalUnitPriceSet": { "shopMoney": { "amount": "30.0" } } } }
            ] }
        }))
        .unwrap();

        let order = convert_order(node);
        assert_eq!(order.id.as_str(), "1001");
        assert!(order.has_refund);
        assert_eq!(order.item_count(), 2);
        assert_eq!(order.customer.unwrap().orders_count, 1);
    }
}
