//! # Backend Interface
//!
//! The untyped capability set every storage engine implements. The typed
//! [`crate::MessageCollection`] wrapper composes these calls; backends never see payload types,
//! only opaque bytes plus a type identity.
//!
//! ## Obligations
//!
//! - `initialize` is idempotent and never alters stored records
//! - `insert` generates the id and creation time; a failed insert leaves nothing visible
//! - `query` returns a lazy cursor over the records matching at query time; an empty `sort_by`
//!   means insertion order, otherwise ties are broken by insertion order
//! - `modify_metadata` merges into the first matching record by insertion order
//! - cursors release their backend resources when dropped

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::metadata::Metadata;
use crate::query::Query;

/// Type identity recorded for a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageType {
    pub datatype: String,
    pub md5sum: String,
}

/// A stored record as returned by a backend cursor.
#[derive(Debug, Clone)]
pub struct RawMessage<Md> {
    pub id: String,
    pub creation_time: DateTime<Utc>,
    pub metadata: Md,
    /// Serialized payload; `None` for metadata-only queries.
    pub payload: Option<Vec<u8>>,
}

/// Forward-only cursor over raw query results.
#[async_trait]
pub trait ResultCursor: Send {
    type Metadata: Metadata;

    /// Returns the next record, or `None` once the results are exhausted.
    async fn next(&mut self) -> Result<Option<RawMessage<Self::Metadata>>>;
}

/// Untyped operations on one collection of a storage engine.
#[async_trait]
pub trait MessageCollectionBackend: Send + Sync + 'static {
    type Query: Query;
    type Metadata: Metadata;
    type Cursor: ResultCursor<Metadata = Self::Metadata> + 'static;

    /// Binds the collection to a type identity.
    ///
    /// Returns `false` when the collection holds records of a different fingerprint; an empty
    /// collection is rebound to the new identity.
    async fn initialize(&self, datatype: &str, md5sum: &str) -> Result<bool>;

    async fn insert(&self, payload: Vec<u8>, metadata: Self::Metadata) -> Result<()>;

    async fn query(
        &self,
        query: &Self::Query,
        sort_by: &str,
        ascending: bool,
        metadata_only: bool,
    ) -> Result<Self::Cursor>;

    /// Deletes every matching record and returns how many were removed.
    async fn remove_messages(&self, query: &Self::Query) -> Result<u64>;

    /// Merges `patch` into the metadata of the first matching record.
    ///
    /// Fails with [`crate::WarehouseError::NoMatchingMessage`] when nothing matches.
    async fn modify_metadata(&self, query: &Self::Query, patch: &Self::Metadata) -> Result<()>;

    async fn count(&self) -> Result<u64>;

    /// Identity currently recorded for the collection, if any.
    async fn message_type(&self) -> Result<Option<MessageType>>;

    fn create_query(&self) -> Self::Query;

    fn create_metadata(&self) -> Self::Metadata;

    fn collection_name(&self) -> String;
}
