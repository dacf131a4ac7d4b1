//! Subcommand implementations.

pub mod search;
pub mod sync;
