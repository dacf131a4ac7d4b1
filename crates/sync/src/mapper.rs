//! Source record to workspace property mapping.
//!
//! Pure functions only; nothing here touches the network. Every text value
//! is clamped to the workspace's 2000-character limit, and select option
//! names are stripped of commas, which the workspace rejects.

use chrono::{DateTime, Utc};
use storesync_core::{LineItem, Order, Product, parse_amount_f64};
use thiserror::Error;

use crate::config::ShopifyConfig;
use crate::notion::{EXTERNAL_ID_PROPERTY, PropertyMap, PropertyValue, TITLE_PROPERTY};

/// Longest text a single rich-text property may hold.
pub const MAX_TEXT_CHARS: usize = 2000;

/// Most tags written per record.
pub const MAX_TAGS: usize = 100;

/// Longest single tag (and select option) name.
pub const MAX_TAG_CHARS: usize = 100;

/// Elements whose boundaries separate words when tags are stripped.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "td", "th",
    "table", "blockquote", "section",
];

/// A record that cannot be mapped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("{kind} has an empty external id")]
    MissingExternalId { kind: &'static str },
}

/// Truncate to at most `max` characters (not bytes).
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn is_block_tag(raw: &str) -> bool {
    let name: String = raw
        .trim_start_matches('/')
        .chars()
        .take_while(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    BLOCK_TAGS.contains(&name.as_str())
}

/// Reduce HTML to plain text.
///
/// Tags are dropped, block-level boundaries become spaces and common entities
/// are decoded. Source whitespace, line breaks included, is kept as is apart
/// from trimming the ends.
#[must_use]
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut tag: Option<String> = None;

    for c in html.chars() {
        if let Some(inner) = tag.as_mut() {
            if c == '>' {
                let block = is_block_tag(inner);
                tag = None;
                if block {
                    out.push(' ');
                }
            } else {
                inner.push(c);
            }
        } else if c == '<' {
            tag = Some(String::new());
        } else {
            out.push(c);
        }
    }
    // Unterminated tag: keep it as text.
    if let Some(unclosed) = tag {
        out.push('<');
        out.push_str(&unclosed);
    }

    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    decoded.trim().to_string()
}

/// Make a string usable as a select option name.
#[must_use]
pub fn sanitize_option(raw: &str) -> String {
    let replaced = raw.replace(',', " ");
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, MAX_TAG_CHARS)
}

/// Trim, sanitize and deduplicate tags, keeping first-seen order.
#[must_use]
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let clean = sanitize_option(tag);
        if clean.is_empty() || out.contains(&clean) {
            continue;
        }
        out.push(clean);
        if out.len() == MAX_TAGS {
            break;
        }
    }
    out
}

fn optional_select(raw: Option<&str>) -> PropertyValue {
    PropertyValue::Select(raw.map(sanitize_option).filter(|s| !s.is_empty()))
}

fn text(raw: &str) -> PropertyValue {
    PropertyValue::RichText(truncate_chars(raw, MAX_TEXT_CHARS))
}

#[allow(clippy::cast_precision_loss)]
fn count(n: u64) -> f64 {
    n as f64
}

/// Properties for a product record.
///
/// # Errors
///
/// Returns an error if the product has no external id.
pub fn product_properties(
    product: &Product,
    shopify: &ShopifyConfig,
    synced_at: DateTime<Utc>,
) -> Result<PropertyMap, MappingError> {
    if product.id.is_empty() {
        return Err(MappingError::MissingExternalId { kind: "product" });
    }

    let primary = product.primary_variant();
    let price = parse_amount_f64(primary.and_then(|v| v.price.as_deref())).unwrap_or(0.0);
    let compare_at = parse_amount_f64(primary.and_then(|v| v.compare_at_price.as_deref()));
    let collections = product
        .collections
        .as_ref()
        .map(|c| c.join(", "))
        .unwrap_or_default();

    let mut props = PropertyMap::new();
    props.insert(
        TITLE_PROPERTY.into(),
        PropertyValue::Title(truncate_chars(&product.title, MAX_TEXT_CHARS)),
    );
    props.insert(EXTERNAL_ID_PROPERTY.into(), text(product.id.as_str()));
    props.insert("Description".into(), text(&strip_html(&product.description_html)));
    props.insert("Vendor".into(), optional_select(product.vendor.as_deref()));
    props.insert(
        "Product Type".into(),
        optional_select(product.product_type.as_deref()),
    );
    props.insert(
        "Tags".into(),
        PropertyValue::MultiSelect(normalize_tags(&product.tags)),
    );
    props.insert(
        "Status".into(),
        PropertyValue::Select(Some(product.status.label().to_string())),
    );
    props.insert("Price".into(), PropertyValue::Number(Some(price)));
    props.insert("Compare At Price".into(), PropertyValue::Number(compare_at));
    props.insert(
        "Inventory".into(),
        PropertyValue::Number(Some(count(product.total_inventory()))),
    );
    props.insert("SKU".into(), text(product.primary_sku().unwrap_or_default()));
    props.insert(
        "Variant Count".into(),
        PropertyValue::Number(Some(count(product.variants.len() as u64))),
    );
    props.insert(
        "Image".into(),
        PropertyValue::Url(product.featured_image.clone()),
    );
    props.insert(
        "Shopify URL".into(),
        PropertyValue::Url(Some(shopify.product_admin_url(product.id.as_str()))),
    );
    props.insert("Collections".into(), text(&collections));
    props.insert("Created At".into(), PropertyValue::Date(product.created_at));
    props.insert("Updated At".into(), PropertyValue::Date(product.updated_at));
    props.insert("Last Synced".into(), PropertyValue::Date(Some(synced_at)));

    Ok(props)
}

/// One line per item: `2x Title (SKU)`.
#[must_use]
pub fn line_item_summary(items: &[LineItem]) -> String {
    let summary = items
        .iter()
        .map(|li| match li.sku.as_deref() {
            Some(sku) => format!("{}x {} ({sku})", li.quantity, li.title),
            None => format!("{}x {}", li.quantity, li.title),
        })
        .collect::<Vec<_>>()
        .join("\n");
    truncate_chars(&summary, MAX_TEXT_CHARS)
}

/// Properties for an order record.
///
/// # Errors
///
/// Returns an error if the order has no external id.
pub fn order_properties(
    order: &Order,
    synced_at: DateTime<Utc>,
) -> Result<PropertyMap, MappingError> {
    if order.id.is_empty() {
        return Err(MappingError::MissingExternalId { kind: "order" });
    }

    let email = order
        .customer
        .as_ref()
        .and_then(|c| c.email.as_deref())
        .unwrap_or_default();

    let mut props = PropertyMap::new();
    props.insert(
        TITLE_PROPERTY.into(),
        PropertyValue::Title(truncate_chars(&order.name, MAX_TEXT_CHARS)),
    );
    props.insert(EXTERNAL_ID_PROPERTY.into(), text(order.id.as_str()));
    props.insert("Created At".into(), PropertyValue::Date(order.created_at));
    props.insert("Cancelled At".into(), PropertyValue::Date(order.cancelled_at));
    props.insert("Customer Email".into(), text(email));
    props.insert(
        "Customer Type".into(),
        PropertyValue::Select(order.customer_type().map(|t| t.label().to_string())),
    );
    props.insert(
        "Total Price".into(),
        PropertyValue::Number(Some(
            parse_amount_f64(Some(&order.total_price)).unwrap_or(0.0),
        )),
    );
    props.insert(
        "Current Total".into(),
        PropertyValue::Number(Some(
            parse_amount_f64(Some(&order.current_total_price)).unwrap_or(0.0),
        )),
    );
    props.insert(
        "Item Count".into(),
        PropertyValue::Number(Some(count(order.item_count()))),
    );
    props.insert(
        "Line Items".into(),
        PropertyValue::RichText(line_item_summary(&order.line_items)),
    );
    props.insert("Has Refund".into(), PropertyValue::Checkbox(order.has_refund));
    props.insert("Last Synced".into(), PropertyValue::Date(Some(synced_at)));

    Ok(props)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use secrecy::SecretString;
    use storesync_core::{
        CustomerId, CustomerRef, OrderId, ProductId, ProductStatus, Variant, VariantId,
    };

    use crate::config::ApiStyle;

    fn shopify() -> ShopifyConfig {
        ShopifyConfig {
            store: "example.myshopify.com".to_string(),
            api_version: "2024-10".to_string(),
            access_token: SecretString::from("shpat_test_token_value"),
            api_style: ApiStyle::GraphQl,
        }
    }

    fn variant(price: Option<&str>, compare_at: Option<&str>, qty: i64) -> Variant {
        Variant {
            id: VariantId::new("7"),
            title: "Default Title".to_string(),
            sku: Some("LS-M".to_string()),
            price: price.map(String::from),
            compare_at_price: compare_at.map(String::from),
            inventory_quantity: Some(qty),
            inventory_item_id: None,
            location_available: None,
        }
    }

    fn product() -> Product {
        Product {
            id: ProductId::new("gid://shopify/Product/42"),
            handle: "linen-shirt".to_string(),
            title: "Linen Shirt".to_string(),
            description_html: "<p>Hello <b>world</b></p>".to_string(),
            vendor: Some("Acme, Inc".to_string()),
            product_type: None,
            tags: vec![
                " summer ".to_string(),
                "summer".to_string(),
                "linen".to_string(),
                String::new(),
            ],
            status: ProductStatus::Archived,
            variants: vec![variant(Some("48.00"), None, 3), variant(Some("50.00"), None, 2)],
            featured_image: None,
            collections: Some(vec!["Summer".to_string(), "Shirts".to_string()]),
            created_at: None,
            updated_at: None,
        }
    }

    fn synced_at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<p>Hello <b>world</b></p>"), "Hello world");
        assert_eq!(strip_html("<p>One</p><p>Two</p>"), "One  Two");
        assert_eq!(strip_html("Fish &amp; Chips"), "Fish & Chips");
        assert_eq!(strip_html("no tags"), "no tags");
    }

    #[test]
    fn test_strip_html_keeps_line_breaks() {
        assert_eq!(
            strip_html("<p>Line one</p>\n<pre>a  b\nc</pre>"),
            "Line one \na  b\nc"
        );
    }

    #[test]
    fn test_truncate_chars_counts_characters() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
        assert_eq!(truncate_chars(&"x".repeat(2500), MAX_TEXT_CHARS).len(), 2000);
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(&product().tags);
        assert_eq!(tags, vec!["summer", "linen"]);

        let many: Vec<String> = (0..150).map(|i| format!("tag-{i}")).collect();
        assert_eq!(normalize_tags(&many).len(), MAX_TAGS);

        let long = vec!["y".repeat(150)];
        assert_eq!(normalize_tags(&long)[0].chars().count(), MAX_TAG_CHARS);
    }

    #[test]
    fn test_long_description_is_stripped_then_truncated() {
        let mut long = product();
        long.description_html = format!("<div><p>{}</p></div>", "é".repeat(2600));

        let props = product_properties(&long, &shopify(), synced_at()).unwrap();
        let PropertyValue::RichText(description) = &props["Description"] else {
            panic!("Description should be rich text");
        };
        assert_eq!(description.chars().count(), MAX_TEXT_CHARS);
        assert!(!description.contains('<'));
        assert!(description.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_product_properties() {
        let props = product_properties(&product(), &shopify(), synced_at()).unwrap();

        assert_eq!(
            props["Shopify ID"],
            PropertyValue::RichText("42".to_string())
        );
        assert_eq!(
            props["Description"],
            PropertyValue::RichText("Hello world".to_string())
        );
        assert_eq!(
            props["Vendor"],
            PropertyValue::Select(Some("Acme Inc".to_string()))
        );
        assert_eq!(props["Product Type"], PropertyValue::Select(None));
        assert_eq!(props["Status"], PropertyValue::Select(Some("Archived".to_string())));
        assert_eq!(props["Price"], PropertyValue::Number(Some(48.0)));
        assert_eq!(props["Inventory"], PropertyValue::Number(Some(5.0)));
        assert_eq!(props["Variant Count"], PropertyValue::Number(Some(2.0)));
        assert_eq!(
            props["Collections"],
            PropertyValue::RichText("Summer, Shirts".to_string())
        );
        assert_eq!(
            props["Shopify URL"],
            PropertyValue::Url(Some(
                "https://example.myshopify.com/admin/products/42".to_string()
            ))
        );
        assert_eq!(props["Last Synced"], PropertyValue::Date(Some(synced_at())));
    }

    #[test]
    fn test_missing_price_is_zero_but_missing_compare_at_is_absent() {
        let mut p = product();
        p.variants = vec![variant(None, None, 0)];
        let props = product_properties(&p, &shopify(), synced_at()).unwrap();
        assert_eq!(props["Price"], PropertyValue::Number(Some(0.0)));
        assert_eq!(props["Compare At Price"], PropertyValue::Number(None));

        p.variants = vec![variant(Some("n/a"), Some("60.00"), 0)];
        let props = product_properties(&p, &shopify(), synced_at()).unwrap();
        assert_eq!(props["Price"], PropertyValue::Number(Some(0.0)));
        assert_eq!(props["Compare At Price"], PropertyValue::Number(Some(60.0)));
    }

    #[test]
    fn test_empty_external_id_is_rejected() {
        let mut p = product();
        p.id = ProductId::new("");
        assert_eq!(
            product_properties(&p, &shopify(), synced_at()),
            Err(MappingError::MissingExternalId { kind: "product" })
        );
    }

    #[test]
    fn test_order_properties() {
        let order = Order {
            id: OrderId::new("gid://shopify/Order/1001"),
            name: "#1001".to_string(),
            created_at: Some(synced_at()),
            cancelled_at: None,
            customer: Some(CustomerRef {
                id: CustomerId::new("5"),
                email: Some("a@example.com".to_string()),
                orders_count: 1,
            }),
            total_price: "60.00".to_string(),
            current_total_price: "40.00".to_string(),
            line_items: vec![
                LineItem {
                    quantity: 2,
                    title: "Linen Shirt".to_string(),
                    sku: Some("LS-M".to_string()),
                    unit_price: Some("30.00".to_string()),
                },
                LineItem {
                    quantity: 1,
                    title: "Gift Card".to_string(),
                    sku: None,
                    unit_price: None,
                },
            ],
            has_refund: true,
        };

        let props = order_properties(&order, synced_at()).unwrap();
        assert_eq!(props["Name"], PropertyValue::Title("#1001".to_string()));
        assert_eq!(
            props["Customer Type"],
            PropertyValue::Select(Some("First-time".to_string()))
        );
        assert_eq!(props["Item Count"], PropertyValue::Number(Some(3.0)));
        assert_eq!(props["Current Total"], PropertyValue::Number(Some(40.0)));
        assert_eq!(
            props["Line Items"],
            PropertyValue::RichText("2x Linen Shirt (LS-M)\n1x Gift Card".to_string())
        );
        assert_eq!(props["Has Refund"], PropertyValue::Checkbox(true));
    }
}
