//! # atelier-shared
//!
//! Identifiers, enums, constants and formatting helpers shared by the store
//! and client crates.

pub mod constants;
pub mod error;
pub mod format;
pub mod types;

pub use error::ValidationError;
