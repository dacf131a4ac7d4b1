//! Typed page properties and their Notion JSON encoding.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};

/// Property name holding the source system's external id.
pub const EXTERNAL_ID_PROPERTY: &str = "Shopify ID";

/// Property name of the title column in every mirrored database.
pub const TITLE_PROPERTY: &str = "Name";

/// A single property value, tagged with its Notion property type.
///
/// `None` payloads encode as explicit JSON `null`, which clears the
/// property on update instead of leaving a stale value behind.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Title(String),
    RichText(String),
    Number(Option<f64>),
    Select(Option<String>),
    MultiSelect(Vec<String>),
    Date(Option<DateTime<Utc>>),
    Url(Option<String>),
    Checkbox(bool),
}

/// Property name to value, ordered for stable request bodies.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

fn text_array(content: &str) -> Value {
    if content.is_empty() {
        json!([])
    } else {
        json!([{ "type": "text", "text": { "content": content } }])
    }
}

impl PropertyValue {
    /// Encode as a Notion property value object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Title(s) => json!({ "title": text_array(s) }),
            Self::RichText(s) => json!({ "rich_text": text_array(s) }),
            Self::Number(n) => json!({ "number": n }),
            Self::Select(name) => json!({ "select": name.as_ref().map(|n| json!({ "name": n })) }),
            Self::MultiSelect(names) => json!({
                "multi_select": names.iter().map(|n| json!({ "name": n })).collect::<Vec<_>>()
            }),
            Self::Date(dt) => json!({ "date": dt.map(|d| json!({ "start": d.to_rfc3339() })) }),
            Self::Url(url) => json!({ "url": url }),
            Self::Checkbox(b) => json!({ "checkbox": b }),
        }
    }
}

/// Encode a whole property map as the `properties` object of a request.
#[must_use]
pub fn encode_properties(properties: &PropertyMap) -> Value {
    let map: Map<String, Value> = properties
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect();
    Value::Object(map)
}

/// A workspace page read back from a database query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkspaceRecord {
    pub page_id: String,
    pub url: Option<String>,
    pub external_id: Option<String>,
    pub title: String,
    pub vendor: Option<String>,
    pub product_type: Option<String>,
    pub tags: Vec<String>,
    pub sku: Option<String>,
    pub price: Option<f64>,
    pub inventory: Option<f64>,
}

impl WorkspaceRecord {
    /// Decode the properties this crate writes from a page object.
    ///
    /// Missing or differently-typed properties decode as absent.
    #[must_use]
    pub fn from_page(page: &Value) -> Self {
        let props = &page["properties"];
        Self {
            page_id: page["id"].as_str().unwrap_or_default().to_string(),
            url: page["url"].as_str().map(String::from),
            external_id: plain_text(&props[EXTERNAL_ID_PROPERTY]["rich_text"]),
            title: plain_text(&props[TITLE_PROPERTY]["title"]).unwrap_or_default(),
            vendor: select_name(&props["Vendor"]),
            product_type: select_name(&props["Product Type"]),
            tags: props["Tags"]["multi_select"]
                .as_array()
                .map(|opts| {
                    opts.iter()
                        .filter_map(|o| o["name"].as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default(),
            sku: plain_text(&props["SKU"]["rich_text"]),
            price: props["Price"]["number"].as_f64(),
            inventory: props["Inventory"]["number"].as_f64(),
        }
    }
}

/// Concatenate the plain text of a rich-text array.
fn plain_text(array: &Value) -> Option<String> {
    let text: String = array
        .as_array()?
        .iter()
        .filter_map(|part| {
            part["plain_text"]
                .as_str()
                .or_else(|| part["text"]["content"].as_str())
        })
        .collect();
    (!text.is_empty()).then_some(text)
}

fn select_name(property: &Value) -> Option<String> {
    property["select"]["name"].as_str().map(String::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_values_encode_as_null() {
        assert_eq!(PropertyValue::Number(None).to_json(), json!({ "number": null }));
        assert_eq!(PropertyValue::Select(None).to_json(), json!({ "select": null }));
        assert_eq!(PropertyValue::Url(None).to_json(), json!({ "url": null }));
        assert_eq!(PropertyValue::Date(None).to_json(), json!({ "date": null }));
    }

    #[test]
    fn test_text_encoding() {
        assert_eq!(
            PropertyValue::Title("Linen Shirt".to_string()).to_json(),
            json!({ "title": [{ "type": "text", "text": { "content": "Linen Shirt" } }] })
        );
        assert_eq!(
            PropertyValue::RichText(String::new()).to_json(),
            json!({ "rich_text": [] })
        );
    }

    #[test]
    fn test_encode_properties_keys_by_name() {
        let mut props = PropertyMap::new();
        props.insert("Has Refund".to_string(), PropertyValue::Checkbox(true));
        props.insert(
            "Tags".to_string(),
            PropertyValue::MultiSelect(vec!["summer".to_string()]),
        );
        let encoded = encode_properties(&props);
        assert_eq!(encoded["Has Refund"], json!({ "checkbox": true }));
        assert_eq!(encoded["Tags"]["multi_select"][0]["name"], "summer");
    }

    #[test]
    fn test_workspace_record_from_page() {
        let page = json!({
            "id": "59833787-2cf9-4fdf-8782-e53db20768a5",
            "url": "https://www.notion.so/Linen-Shirt-598337872cf94fdf8782e53db20768a5",
            "properties": {
                "Name": { "type": "title", "title": [{ "plain_text": "Linen " }, { "plain_text": "Shirt" }] },
                "Shopify ID": { "type": "rich_text", "rich_text": [{ "plain_text": "42" }] },
                "Vendor": { "type": "select", "select": { "name": "Acme" } },
                "Product Type": { "type": "select", "select": null },
                "Tags": { "type": "multi_select", "multi_select": [{ "name": "summer" }] },
                "Price": { "type": "number", "number": 48.0 }
            }
        });

        let record = WorkspaceRecord::from_page(&page);
        assert_eq!(record.title, "Linen Shirt");
        assert_eq!(record.external_id.as_deref(), Some("42"));
        assert_eq!(record.vendor.as_deref(), Some("Acme"));
        assert_eq!(record.product_type, None);
        assert_eq!(record.tags, vec!["summer"]);
        assert_eq!(record.price, Some(48.0));
        assert_eq!(record.sku, None);
    }
}
