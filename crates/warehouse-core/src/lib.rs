//! # Warehouse Core
//!
//! Core types and traits for storing typed, timestamped messages with queryable metadata.
//! Storage engines implement [`MessageCollectionBackend`]; application code talks to the
//! type-safe [`MessageCollection`] wrapper.
//!
//! ## Modules
//!
//! - [`error`] - WarehouseError and the crate Result alias
//! - [`value`] - MetadataValue, Comparison, Condition and reserved field names
//! - [`query`] - Query builder trait
//! - [`metadata`] - Metadata dictionary trait
//! - [`message`] - Message trait, schema fingerprints and `json_message!`
//! - [`backend`] - MessageCollectionBackend and ResultCursor traits, RawMessage
//! - [`results`] - QueryResults and MessageWithMetadata
//! - [`collection`] - MessageCollection typed wrapper

pub mod backend;
pub mod collection;
pub mod error;
pub mod message;
pub mod metadata;
pub mod query;
pub mod results;
pub mod value;

#[cfg(test)]
mod collection_test;

pub use backend::{MessageCollectionBackend, MessageType, RawMessage, ResultCursor};
pub use collection::MessageCollection;
pub use error::{Result, WarehouseError};
pub use message::{schema_fingerprint, Message};
pub use metadata::{validate_metadata, Metadata};
pub use query::Query;
pub use results::{MessageWithMetadata, QueryResults};
pub use value::{
    is_reserved_field, Comparison, Condition, MetadataValue, CREATION_TIME_FIELD, ID_FIELD,
};

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
