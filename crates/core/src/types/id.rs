//! Newtype external ids for type-safe record references.
//!
//! Use the `define_external_id!` macro to create type-safe wrappers around
//! the source system's opaque identifiers. The wrapped value is always the
//! numeric tail of the id (`123`, never `gid://shopify/Product/123`) so that
//! both source API styles key the same target record.

/// Macro to define a type-safe external id wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Display` implementations
///
/// `new()` strips a global-id prefix, so `ProductId::new("gid://shopify/Product/7")`
/// and `ProductId::new("7")` compare equal.
///
/// # Example
///
/// ```rust
/// # use storesync_core::define_external_id;
/// define_external_id!(WidgetId);
///
/// let id = WidgetId::new("gid://shopify/Widget/42");
/// assert_eq!(id.as_str(), "42");
/// ```
#[macro_export]
macro_rules! define_external_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new id, normalizing global ids to their numeric tail.
            #[must_use]
            pub fn new(id: impl AsRef<str>) -> Self {
                Self($crate::types::id::strip_gid(id.as_ref()).to_string())
            }

            /// Get the underlying id string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Convert into the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Whether the id is empty (unusable as a natural key).
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self::new(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Strip a `gid://shopify/<Type>/` prefix, returning the trailing id.
///
/// Query-string suffixes on global ids (`?inventory_item_id=...`) are dropped
/// as well. Plain ids are returned unchanged.
#[must_use]
pub fn strip_gid(id: &str) -> &str {
    let trimmed = id.trim();
    if !trimmed.starts_with("gid://") {
        return trimmed;
    }
    let without_query = trimmed.split('?').next().unwrap_or(trimmed);
    without_query.rsplit('/').next().unwrap_or(without_query)
}

define_external_id!(ProductId);
define_external_id!(VariantId);
define_external_id!(InventoryItemId);
define_external_id!(OrderId);
define_external_id!(CustomerId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gid_and_plain_ids_compare_equal() {
        assert_eq!(
            ProductId::new("gid://shopify/Product/8123"),
            ProductId::new("8123")
        );
    }

    #[test]
    fn test_strip_gid_drops_query_suffix() {
        assert_eq!(
            strip_gid("gid://shopify/Order/55?key=abc"),
            "55"
        );
    }

    #[test]
    fn test_plain_id_is_trimmed() {
        assert_eq!(OrderId::new("  991 ").as_str(), "991");
    }

    #[test]
    fn test_serde_transparent() {
        let id = VariantId::new("17");
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "\"17\"");
    }
}
