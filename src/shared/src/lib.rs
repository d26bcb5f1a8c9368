//! Shared types for the storefront notification and campaign engine

pub mod types;

pub use types::*;
