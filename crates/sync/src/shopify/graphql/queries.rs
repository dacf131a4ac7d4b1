//! GraphQL query documents and response shapes for the Shopify Admin API.
//!
//! Requests are sent as `graphql_client::QueryBody` envelopes. Response shapes
//! are hand-written to cover exactly the fields each document selects.

use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Documents
// =============================================================================

const PRODUCT_FIELDS: &str = r#"
fragment ProductFields on Product {
  id
  handle
  title
  descriptionHtml
  vendor
  productType
  tags
  status
  createdAt
  updatedAt
  featuredImage { url }
  collections(first: 20) { edges { node { title } } }
  variants(first: 100) {
    edges {
      node {
        id
        title
        sku
        price
        compareAtPrice
        inventoryQuantity
        inventoryItem {
          id
          inventoryLevels(first: 20) {
            edges { node { quantities(names: ["available"]) { name quantity } } }
          }
        }
      }
    }
  }
}
"#;

/// Page through all products, or a filtered subset when `query` is set.
pub const PRODUCTS_OPERATION: &str = "SyncProducts";

/// Page through all orders, oldest first.
pub const ORDERS_OPERATION: &str = "SyncOrders";

/// Collection lookup by handle.
pub const COLLECTION_OPERATION: &str = "CollectionByHandle";

/// Full products document (operation + fragment).
#[must_use]
pub fn products_document() -> &'static str {
    static DOCUMENT: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
        format!(
            r"
query SyncProducts($first: Int!, $after: String, $query: String) {{
  products(first: $first, after: $after, query: $query, sortKey: ID) {{
    pageInfo {{ hasNextPage endCursor }}
    edges {{ node {{ ...ProductFields }} }}
  }}
}}
{PRODUCT_FIELDS}"
        )
    });
    DOCUMENT.as_str()
}

/// Full collection document (operation + fragment).
#[must_use]
pub fn collection_document() -> &'static str {
    static DOCUMENT: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
        format!(
            r"
query CollectionByHandle($handle: String!, $first: Int!) {{
  collectionByHandle(handle: $handle) {{
    handle
    title
    products(first: $first) {{
      edges {{ node {{ ...ProductFields }} }}
    }}
  }}
}}
{PRODUCT_FIELDS}"
        )
    });
    DOCUMENT.as_str()
}

/// Orders document.
pub const ORDERS_DOCUMENT: &str = r"
query SyncOrders($first: Int!, $after: String) {
  orders(first: $first, after: $after, sortKey: CREATED_AT) {
    pageInfo { hasNextPage endCursor }
    edges {
      node {
        id
        name
        createdAt
        cancelledAt
        customer { id email numberOfOrders }
        totalPriceSet { shopMoney { amount } }
        currentTotalPriceSet { shopMoney { amount } }
        refunds { id }
        lineItems(first: 100) {
          edges {
            node {
              quantity
              title
              sku
              originalUnitPriceSet { shopMoney { amount } }
            }
          }
        }
      }
    }
  }
}
";

// =============================================================================
// Variables
// =============================================================================

/// Variables for [`PRODUCTS_OPERATION`].
#[derive(Debug, Clone, Serialize)]
pub struct ProductsVariables {
    pub first: i64,
    pub after: Option<String>,
    pub query: Option<String>,
}

/// Variables for [`ORDERS_OPERATION`].
#[derive(Debug, Clone, Serialize)]
pub struct OrdersVariables {
    pub first: i64,
    pub after: Option<String>,
}

/// Variables for [`COLLECTION_OPERATION`].
#[derive(Debug, Clone, Serialize)]
pub struct CollectionVariables {
    pub handle: String,
    pub first: i64,
}

// =============================================================================
// Response shapes
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    #[serde(default)]
    pub page_info: Option<PageInfo>,
}

impl<T> Connection<T> {
    /// Cursor for the next page, if the connection says there is one.
    pub fn next_cursor(&self) -> Option<String> {
        self.page_info
            .as_ref()
            .filter(|p| p.has_next_page)
            .and_then(|p| p.end_cursor.clone())
    }

    pub fn into_nodes(self) -> impl Iterator<Item = T> {
        self.edges.into_iter().map(|e| e.node)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Edge<T> {
    pub node: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductsData {
    pub products: Connection<ProductNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionData {
    pub collection_by_handle: Option<CollectionNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionNode {
    pub handle: String,
    pub title: String,
    pub products: Connection<ProductNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrdersData {
    pub orders: Connection<OrderNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductNode {
    pub id: String,
    pub handle: String,
    pub title: String,
    #[serde(default)]
    pub description_html: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub status: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub featured_image: Option<ImageNode>,
    #[serde(default)]
    pub collections: Option<Connection<TitleNode>>,
    pub variants: Connection<VariantNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageNode {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TitleNode {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantNode {
    pub id: String,
    pub title: String,
    pub sku: Option<String>,
    pub price: Option<String>,
    pub compare_at_price: Option<String>,
    pub inventory_quantity: Option<i64>,
    pub inventory_item: Option<InventoryItemNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItemNode {
    pub id: String,
    #[serde(default)]
    pub inventory_levels: Option<Connection<InventoryLevelNode>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryLevelNode {
    #[serde(default)]
    pub quantities: Vec<QuantityNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuantityNode {
    pub name: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderNode {
    pub id: String,
    pub name: String,
    pub created_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub customer: Option<CustomerNode>,
    pub total_price_set: MoneyBag,
    pub current_total_price_set: MoneyBag,
    #[serde(default)]
    pub refunds: Vec<RefundNode>,
    pub line_items: Connection<LineItemNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerNode {
    pub id: String,
    pub email: Option<String>,
    /// `UnsignedInt64` scalar, serialized as a string.
    #[serde(deserialize_with = "lenient_u64")]
    pub number_of_orders: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundNode {
    #[allow(dead_code)] // Only presence matters
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemNode {
    pub quantity: u32,
    pub title: String,
    pub sku: Option<String>,
    pub original_unit_price_set: Option<MoneyBag>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyBag {
    pub shop_money: MoneyV2,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoneyV2 {
    pub amount: String,
}

/// Accept a `u64` encoded either as a JSON number or a string.
fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Build the product search filter for a keyword.
///
/// Matches title, vendor, product type and SKU by substring and tags by
/// exact value. Characters with meaning in the search syntax are dropped.
#[must_use]
pub fn keyword_search_query(keyword: &str) -> String {
    let cleaned: String = keyword
        .chars()
        .filter(|c| !matches!(c, '"' | '\\' | ':' | '(' | ')' | '*'))
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.contains(char::is_whitespace) {
        let phrase = format!("\"{cleaned}\"");
        ["title", "vendor", "product_type", "tag", "sku"]
            .iter()
            .map(|field| format!("{field}:{phrase}"))
            .collect::<Vec<_>>()
            .join(" OR ")
    } else {
        format!(
            "title:*{cleaned}* OR vendor:*{cleaned}* OR product_type:*{cleaned}* OR tag:{cleaned} OR sku:*{cleaned}*"
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_products_document_includes_fragment() {
        let doc = products_document();
        assert!(doc.contains("query SyncProducts"));
        assert!(doc.contains("fragment ProductFields on Product"));
        assert!(doc.contains("...ProductFields"));
    }

    #[test]
    fn test_keyword_search_query_single_word() {
        assert_eq!(
            keyword_search_query("linen"),
            "title:*linen* OR vendor:*linen* OR product_type:*linen* OR tag:linen OR sku:*linen*"
        );
    }

    #[test]
    fn test_keyword_search_query_phrase_is_quoted_and_cleaned() {
        let q = keyword_search_query("summer (sale)");
        assert!(q.starts_with("title:\"summer sale\""));
        assert!(q.contains("tag:\"summer sale\""));
    }

    #[test]
    fn test_customer_order_count_accepts_string_scalar() {
        let json = serde_json::json!({
            "id": "gid://shopify/Customer/1",
            "email": "a@example.com",
            "numberOfOrders": "3"
        });
        let customer: CustomerNode = serde_json::from_value(json).unwrap();
        assert_eq!(customer.number_of_orders, 3);
    }

    #[test]
    fn test_connection_next_cursor() {
        let json = serde_json::json!({
            "edges": [],
            "pageInfo": { "hasNextPage": false, "endCursor": "abc" }
        });
        let conn: Connection<TitleNode> = serde_json::from_value(json).unwrap();
        assert_eq!(conn.next_cursor(), None);
    }
}
