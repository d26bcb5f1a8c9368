//! Record store layer for the storefront notification engine
//!
//! The engine treats storage as an opaque CRUD repository over named
//! collections of JSON documents. This crate defines that contract
//! ([`RecordStore`]), the query vocabulary (filters, sorting, pagination)
//! and an in-memory implementation used by the binary and the tests.

pub mod repositories;

pub use repositories::*;

/// Errors surfaced by record store implementations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Record not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Record already exists: {collection}/{id}")]
    Conflict { collection: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl DatabaseError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn conflict(collection: &str, id: &str) -> Self {
        Self::Conflict {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}
