//! Exchange provider implementations.

pub mod bitmex;

// Re-export for convenience
pub use bitmex::{BitmexClient, BitmexParser, new_bitmex_client};
