//! # Message Collection
//!
//! [`MessageCollection`] binds a payload type `M` to one backend collection. It checks the
//! type identity once at construction, encodes payloads on insert and decodes them on query.
//!
//! ## Example
//!
//! ```rust,ignore
//! let coll: MessageCollection<Temperature, _> = MessageCollection::new(backend).await?;
//!
//! let mut md = coll.create_metadata();
//! md.append("robot", "r2");
//! coll.insert(&Temperature { temperature: 21.5 }, md).await?;
//!
//! let mut q = coll.create_query();
//! q.append("robot", "r2");
//! let found = coll.find_one(&q, false).await?;
//! assert_eq!(found.temperature, 21.5);
//! ```
//!
//! ## Sharing
//!
//! Clones share the same backend collection through an `Arc`; the wrapper adds no locking of
//! its own.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{MessageCollectionBackend, MessageType};
use crate::error::{Result, WarehouseError};
use crate::message::Message;
use crate::results::{MessageWithMetadata, QueryResults};

/// Typed view of a backend collection holding messages of type `M`.
pub struct MessageCollection<M, B> {
    collection: Arc<B>,
    md5sum_matches: bool,
    _message: PhantomData<fn() -> M>,
}

impl<M, B> Clone for MessageCollection<M, B> {
    fn clone(&self) -> Self {
        Self {
            collection: Arc::clone(&self.collection),
            md5sum_matches: self.md5sum_matches,
            _message: PhantomData,
        }
    }
}

impl<M, B> MessageCollection<M, B>
where
    M: Message,
    B: MessageCollectionBackend,
{
    /// Binds to `collection` and initializes it with `M`'s type identity.
    ///
    /// A fingerprint mismatch does not fail construction; it is reported by
    /// [`MessageCollection::md5sum_matches`].
    pub async fn new(collection: Arc<B>) -> Result<Self> {
        let md5sum = M::md5sum();
        let md5sum_matches = collection.initialize(M::DATATYPE, &md5sum).await?;

        if md5sum_matches {
            info!(
                collection = %collection.collection_name(),
                datatype = M::DATATYPE,
                "Opened message collection"
            );
        } else {
            warn!(
                collection = %collection.collection_name(),
                datatype = M::DATATYPE,
                md5sum = %md5sum,
                "Stored messages have a different md5sum; only metadata can be trusted"
            );
        }

        Ok(Self {
            collection,
            md5sum_matches,
            _message: PhantomData,
        })
    }

    /// Whether the messages stored in the collection have `M`'s fingerprint.
    pub fn md5sum_matches(&self) -> bool {
        self.md5sum_matches
    }

    /// Like [`MessageCollection::md5sum_matches`], as an error for callers that refuse to
    /// work with a mismatched collection.
    pub fn ensure_md5sum_matches(&self) -> Result<()> {
        if self.md5sum_matches {
            Ok(())
        } else {
            Err(self.type_mismatch())
        }
    }

    /// Stores `msg` with `metadata`. The backend generates `_id` and `creation_time`.
    ///
    /// Refused with [`WarehouseError::TypeMismatch`] when the collection holds another type.
    pub async fn insert(&self, msg: &M, metadata: B::Metadata) -> Result<()> {
        if !self.md5sum_matches {
            return Err(self.type_mismatch());
        }
        let payload = msg.encode()?;
        self.collection.insert(payload, metadata).await
    }

    /// Lazily iterates the messages matching `query`.
    ///
    /// With `metadata_only`, payloads are not fetched and each result carries `M::default()`.
    /// An empty `sort_by` keeps insertion order.
    pub async fn query(
        &self,
        query: &B::Query,
        metadata_only: bool,
        sort_by: &str,
        ascending: bool,
    ) -> Result<QueryResults<M, B::Cursor>> {
        debug!(
            collection = %self.collection.collection_name(),
            ?query,
            metadata_only,
            sort_by,
            ascending,
            "Querying message collection"
        );
        if !self.md5sum_matches && !metadata_only {
            warn!(
                collection = %self.collection.collection_name(),
                datatype = M::DATATYPE,
                "Decoding payloads stored under a different md5sum"
            );
        }
        let cursor = self
            .collection
            .query(query, sort_by, ascending, metadata_only)
            .await?;
        Ok(QueryResults::new(cursor, metadata_only))
    }

    /// [`MessageCollection::query`] drained into a `Vec`.
    pub async fn query_list(
        &self,
        query: &B::Query,
        metadata_only: bool,
        sort_by: &str,
        ascending: bool,
    ) -> Result<Vec<MessageWithMetadata<M, B::Metadata>>> {
        self.query(query, metadata_only, sort_by, ascending)
            .await?
            .collect_all()
            .await
    }

    /// Returns the first message matching `query`.
    pub async fn find_one(
        &self,
        query: &B::Query,
        metadata_only: bool,
    ) -> Result<MessageWithMetadata<M, B::Metadata>> {
        let mut results = self.query(query, metadata_only, "", true).await?;
        results.try_next().await?.ok_or_else(|| {
            WarehouseError::NoMatchingMessage(format!(
                "no message in {} matches {:?}",
                self.collection.collection_name(),
                query
            ))
        })
    }

    pub async fn remove_messages(&self, query: &B::Query) -> Result<u64> {
        self.collection.remove_messages(query).await
    }

    /// Overwrites the keys of `patch` in the first matching message, keeping other keys.
    pub async fn modify_metadata(&self, query: &B::Query, patch: &B::Metadata) -> Result<()> {
        self.collection.modify_metadata(query, patch).await
    }

    pub async fn count(&self) -> Result<u64> {
        self.collection.count().await
    }

    pub async fn message_type(&self) -> Result<Option<MessageType>> {
        self.collection.message_type().await
    }

    pub fn create_query(&self) -> B::Query {
        self.collection.create_query()
    }

    pub fn create_metadata(&self) -> B::Metadata {
        self.collection.create_metadata()
    }

    pub fn collection_name(&self) -> String {
        self.collection.collection_name()
    }

    /// The shared backend collection.
    pub fn backend(&self) -> &Arc<B> {
        &self.collection
    }

    fn type_mismatch(&self) -> WarehouseError {
        WarehouseError::TypeMismatch {
            collection: self.collection.collection_name(),
            datatype: M::DATATYPE.to_string(),
        }
    }
}
