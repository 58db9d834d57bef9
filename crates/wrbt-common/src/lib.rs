//! # wrbt-common
//!
//! Shared types, configuration, error handling, and the token codec used across all WRBT crates.
//! This is the foundation layer. It holds primitives and contracts but no storage or routing.

pub mod config;
pub mod crypto;
pub mod error;
pub mod ids;
pub mod models;
pub mod validation;
