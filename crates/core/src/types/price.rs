//! Money amount parsing.
//!
//! Both source API styles report money as decimal strings (`"19.99"`).
//! Aggregates (order revenue) are summed as [`Decimal`] to avoid float drift;
//! target-side number properties take an `f64`.

use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Parse a decimal money string.
///
/// Returns `None` for empty, non-numeric or negative input.
#[must_use]
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .ok()
        .filter(|amount| !amount.is_sign_negative())
}

/// Parse an optional money string as floating point.
///
/// `None` in means `None` out, which lets callers keep "absent" distinct from
/// zero. Unparseable strings also yield `None`.
#[must_use]
pub fn parse_amount_f64(raw: Option<&str>) -> Option<f64> {
    let raw = raw?.trim();
    parse_amount(raw)
        .and_then(|amount| amount.to_f64())
        .or_else(|| raw.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0))
}
