//! Core domain models shared across all WRBT crates.
//!
//! These are the "truth" types: what the registry stores and the API serializes.
//! Identifiers are UUID v7 (time-sortable).

pub mod allowlist;
pub mod audit;
pub mod bot;

/// Re-export all model types for convenience.
pub use allowlist::*;
pub use audit::*;
pub use bot::*;
