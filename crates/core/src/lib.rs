//! storesync core - Shared domain types.
//!
//! This crate provides the catalog and order types used across all storesync
//! components:
//! - `storesync` - Source clients, field mapping, upsert and search pipelines
//! - `cli` - Command-line entry point for scheduled syncs and ad-hoc search
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no HTTP
//! clients. Both source API styles convert their wire payloads into these
//! types, so everything downstream of the fetcher is style-agnostic.
//!
//! # Modules
//!
//! - [`types`] - External ids, products, orders, statuses and money parsing

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
