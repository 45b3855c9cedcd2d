//! Warehouse error types.
//!
//! Backends map their driver errors into [`WarehouseError::Database`] or
//! [`WarehouseError::Write`]; the typed wrapper adds only
//! [`WarehouseError::NoMatchingMessage`] and [`WarehouseError::TypeMismatch`].

use thiserror::Error;

/// Errors that can occur when using a message collection.
#[derive(Error, Debug)]
pub enum WarehouseError {
    /// Backend or connectivity failure, propagated unchanged.
    #[error("Database error: {0}")]
    Database(String),
    /// A record could not be durably stored.
    #[error("Write failed: {0}")]
    Write(String),
    /// No stored message matched the query.
    #[error("No matching message: {0}")]
    NoMatchingMessage(String),
    /// The collection is bound to a different message type than the one compiled in.
    #[error("Message type mismatch: collection {collection} does not hold {datatype}")]
    TypeMismatch { collection: String, datatype: String },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),
}

pub type Result<T> = std::result::Result<T, WarehouseError>;
