//! Status enums for source entities.

use serde::{Deserialize, Serialize};

/// Product publication status.
///
/// Maps to Shopify's product status values. Both API styles spell these
/// differently (`ACTIVE` vs `active`); [`ProductStatus::parse`] accepts either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    /// Product is visible on the storefront.
    #[default]
    Active,
    /// Product is not visible (work in progress).
    Draft,
    /// Product is hidden/archived.
    Archived,
}

impl ProductStatus {
    /// Parse a source status string, case-insensitively.
    ///
    /// Unknown values (e.g. `UNLISTED`) map to `Draft`, since they are not
    /// publicly listed.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Self::Active,
            "archived" => Self::Archived,
            _ => Self::Draft,
        }
    }

    /// Human-readable label used as the target select option.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Draft => "Draft",
            Self::Archived => "Archived",
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Customer classification at the time of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerType {
    /// The order is the customer's first.
    FirstTime,
    /// The customer had ordered before.
    Returning,
}

impl CustomerType {
    /// Classify by the customer's historical order count.
    ///
    /// A count of zero or one means this order is the first.
    #[must_use]
    pub const fn from_order_count(count: u64) -> Self {
        if count <= 1 {
            Self::FirstTime
        } else {
            Self::Returning
        }
    }

    /// Human-readable label used as the target select option.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FirstTime => "First-time",
            Self::Returning => "Returning",
        }
    }
}

impl std::fmt::Display for CustomerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
