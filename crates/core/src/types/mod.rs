//! Core types for storesync.
//!
//! This module provides type-safe wrappers for the source catalog.

pub mod id;
pub mod order;
pub mod price;
pub mod product;
pub mod status;

pub use id::*;
pub use order::{CustomerRef, LineItem, Order};
pub use price::{parse_amount, parse_amount_f64};
pub use product::{Product, Variant};
pub use status::*;
