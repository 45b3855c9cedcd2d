//! In-memory collection and cursor.
//!
//! Records are kept in insertion order, so "first by insertion order" is simply the first
//! match in the vector. A cursor snapshots the sequence numbers of the matching records at
//! query time and resolves each one lazily; records removed in between are skipped.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warehouse_core::{
    validate_metadata, Metadata, MessageCollectionBackend, MessageType, MetadataValue,
    RawMessage, Result, ResultCursor, WarehouseError, CREATION_TIME_FIELD, ID_FIELD,
};

use crate::types::{InMemoryMetadata, InMemoryQuery};

#[derive(Debug, Clone)]
struct StoredMessage {
    seq: u64,
    id: String,
    creation_time: DateTime<Utc>,
    payload: Arc<Vec<u8>>,
    metadata: InMemoryMetadata,
}

impl StoredMessage {
    fn field(&self, name: &str) -> Option<MetadataValue> {
        match name {
            ID_FIELD => Some(MetadataValue::String(self.id.clone())),
            CREATION_TIME_FIELD => Some(MetadataValue::Timestamp(self.creation_time)),
            _ => self.metadata.value_ref(name).cloned(),
        }
    }

    fn matches(&self, query: &InMemoryQuery) -> bool {
        query
            .conditions()
            .iter()
            .all(|c| c.matches(self.field(&c.field).as_ref()))
    }

    fn to_raw(&self, metadata_only: bool) -> RawMessage<InMemoryMetadata> {
        RawMessage {
            id: self.id.clone(),
            creation_time: self.creation_time,
            metadata: self.metadata.clone(),
            payload: if metadata_only {
                None
            } else {
                Some(self.payload.as_ref().clone())
            },
        }
    }
}

/// Shared state of one named collection.
#[derive(Debug, Default)]
pub(crate) struct CollectionState {
    identity: Option<MessageType>,
    messages: Vec<StoredMessage>,
    next_seq: u64,
}

impl CollectionState {
    pub(crate) fn identity(&self) -> Option<&MessageType> {
        self.identity.as_ref()
    }

    fn position(&self, seq: u64) -> Option<usize> {
        self.messages.binary_search_by_key(&seq, |m| m.seq).ok()
    }
}

/// A collection held entirely in process memory.
#[derive(Debug, Clone)]
pub struct InMemoryCollection {
    name: String,
    state: Arc<RwLock<CollectionState>>,
}

impl InMemoryCollection {
    /// Creates a standalone, empty collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_state(name.into(), Arc::new(RwLock::new(CollectionState::default())))
    }

    pub(crate) fn with_state(name: String, state: Arc<RwLock<CollectionState>>) -> Self {
        Self { name, state }
    }
}

#[async_trait]
impl MessageCollectionBackend for InMemoryCollection {
    type Query = InMemoryQuery;
    type Metadata = InMemoryMetadata;
    type Cursor = InMemoryCursor;

    async fn initialize(&self, datatype: &str, md5sum: &str) -> Result<bool> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let requested = MessageType {
            datatype: datatype.to_string(),
            md5sum: md5sum.to_string(),
        };

        match &state.identity {
            Some(current) if current.md5sum == md5sum => Ok(true),
            Some(current) if !state.messages.is_empty() => {
                warn!(
                    collection = %self.name,
                    stored_datatype = %current.datatype,
                    stored_md5sum = %current.md5sum,
                    datatype,
                    md5sum,
                    "md5sum mismatch for non-empty collection"
                );
                Ok(false)
            }
            _ => {
                info!(collection = %self.name, datatype, md5sum, "Binding collection type");
                state.identity = Some(requested);
                Ok(true)
            }
        }
    }

    async fn insert(&self, payload: Vec<u8>, metadata: InMemoryMetadata) -> Result<()> {
        validate_metadata(&metadata)?;

        let mut state = self.state.write().await;
        let seq = state.next_seq;
        state.next_seq += 1;
        let id = Uuid::new_v4().to_string();
        debug!(collection = %self.name, id = %id, size = payload.len(), "Inserting message");
        state.messages.push(StoredMessage {
            seq,
            id,
            creation_time: Utc::now(),
            payload: Arc::new(payload),
            metadata,
        });
        Ok(())
    }

    async fn query(
        &self,
        query: &InMemoryQuery,
        sort_by: &str,
        ascending: bool,
        metadata_only: bool,
    ) -> Result<InMemoryCursor> {
        let state = self.state.read().await;
        let mut matching: Vec<(u64, Option<MetadataValue>)> = state
            .messages
            .iter()
            .filter(|m| m.matches(query))
            .map(|m| {
                let key = if sort_by.is_empty() {
                    None
                } else {
                    m.field(sort_by)
                };
                (m.seq, key)
            })
            .collect();

        if !sort_by.is_empty() {
            matching.sort_by(|(seq_a, key_a), (seq_b, key_b)| {
                let ordering = MetadataValue::sort_cmp(key_a.as_ref(), key_b.as_ref());
                let ordering = if ascending {
                    ordering
                } else {
                    ordering.reverse()
                };
                ordering.then(seq_a.cmp(seq_b))
            });
        }

        debug!(
            collection = %self.name,
            matches = matching.len(),
            "In-memory query resolved"
        );

        Ok(InMemoryCursor {
            state: Arc::clone(&self.state),
            seqs: matching
                .into_iter()
                .map(|(seq, _)| seq)
                .collect::<Vec<_>>()
                .into_iter(),
            metadata_only,
        })
    }

    async fn remove_messages(&self, query: &InMemoryQuery) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.messages.len();
        state.messages.retain(|m| !m.matches(query));
        let removed = (before - state.messages.len()) as u64;
        info!(collection = %self.name, removed, "Removed messages");
        Ok(removed)
    }

    async fn modify_metadata(&self, query: &InMemoryQuery, patch: &InMemoryMetadata) -> Result<()> {
        validate_metadata(patch)?;

        let mut state = self.state.write().await;
        match state.messages.iter_mut().find(|m| m.matches(query)) {
            Some(message) => {
                message.metadata.merge(patch);
                debug!(collection = %self.name, id = %message.id, "Modified metadata");
                Ok(())
            }
            None => Err(WarehouseError::NoMatchingMessage(format!(
                "no message in {} matches {:?}",
                self.name, query
            ))),
        }
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.state.read().await.messages.len() as u64)
    }

    async fn message_type(&self) -> Result<Option<MessageType>> {
        Ok(self.state.read().await.identity.clone())
    }

    fn create_query(&self) -> InMemoryQuery {
        InMemoryQuery::new()
    }

    fn create_metadata(&self) -> InMemoryMetadata {
        InMemoryMetadata::new()
    }

    fn collection_name(&self) -> String {
        self.name.clone()
    }
}

/// Cursor over a snapshot of matching sequence numbers.
pub struct InMemoryCursor {
    state: Arc<RwLock<CollectionState>>,
    seqs: std::vec::IntoIter<u64>,
    metadata_only: bool,
}

impl InMemoryCursor {
    /// Number of snapshot entries not yet visited.
    pub fn remaining(&self) -> usize {
        self.seqs.len()
    }
}

#[async_trait]
impl ResultCursor for InMemoryCursor {
    type Metadata = InMemoryMetadata;

    async fn next(&mut self) -> Result<Option<RawMessage<InMemoryMetadata>>> {
        let state = self.state.read().await;
        for seq in self.seqs.by_ref() {
            if let Some(idx) = state.position(seq) {
                return Ok(Some(state.messages[idx].to_raw(self.metadata_only)));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warehouse_core::Query;

    fn metadata(pairs: &[(&str, MetadataValue)]) -> InMemoryMetadata {
        let mut md = InMemoryMetadata::new();
        for (k, v) in pairs {
            md.set_value(k, v.clone());
        }
        md
    }

    async fn drain(mut cursor: InMemoryCursor) -> Vec<RawMessage<InMemoryMetadata>> {
        let mut out = Vec::new();
        while let Some(raw) = cursor.next().await.unwrap() {
            out.push(raw);
        }
        out
    }

    #[tokio::test]
    async fn test_initialize_binds_then_detects_mismatch() {
        let coll = InMemoryCollection::new("readings");

        assert!(coll.initialize("pkg/A", "aaa").await.unwrap());
        assert!(coll.initialize("pkg/A", "aaa").await.unwrap());

        coll.insert(b"x".to_vec(), InMemoryMetadata::new()).await.unwrap();
        assert!(!coll.initialize("pkg/B", "bbb").await.unwrap());

        let identity = coll.message_type().await.unwrap().unwrap();
        assert_eq!(identity.datatype, "pkg/A");
        assert_eq!(coll.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_collection_is_rebound() {
        let coll = InMemoryCollection::new("readings");
        assert!(coll.initialize("pkg/A", "aaa").await.unwrap());
        assert!(coll.initialize("pkg/B", "bbb").await.unwrap());
        assert_eq!(coll.message_type().await.unwrap().unwrap().md5sum, "bbb");
    }

    #[tokio::test]
    async fn test_insert_rejects_reserved_keys() {
        let coll = InMemoryCollection::new("readings");
        let md = metadata(&[("creation_time", MetadataValue::Integer(1))]);

        let err = coll.insert(b"x".to_vec(), md).await.unwrap_err();
        assert!(matches!(err, WarehouseError::InvalidMetadata(_)));
        assert_eq!(coll.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sort_descending_breaks_ties_by_insertion_order() {
        let coll = InMemoryCollection::new("readings");
        for (payload, n) in [(b"a", 1), (b"b", 2), (b"c", 1), (b"d", 2)] {
            coll.insert(payload.to_vec(), metadata(&[("n", MetadataValue::Integer(n))]))
                .await
                .unwrap();
        }

        let cursor = coll.query(&InMemoryQuery::new(), "n", false, false).await.unwrap();
        let payloads: Vec<Vec<u8>> = drain(cursor)
            .await
            .into_iter()
            .filter_map(|raw| raw.payload)
            .collect();

        assert_eq!(
            payloads,
            vec![b"b".to_vec(), b"d".to_vec(), b"a".to_vec(), b"c".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_cursor_skips_records_removed_after_query() {
        let coll = InMemoryCollection::new("readings");
        for n in 0..3 {
            coll.insert(vec![n as u8], metadata(&[("n", MetadataValue::Integer(n))]))
                .await
                .unwrap();
        }

        let cursor = coll.query(&InMemoryQuery::new(), "", true, true).await.unwrap();
        assert_eq!(cursor.remaining(), 3);

        let mut q = InMemoryQuery::new();
        q.append("n", 1);
        assert_eq!(coll.remove_messages(&q).await.unwrap(), 1);

        let results = drain(cursor).await;
        let ns: Vec<i64> = results
            .iter()
            .filter_map(|r| r.metadata.lookup_int("n"))
            .collect();
        assert_eq!(ns, vec![0, 2]);
        assert!(results.iter().all(|r| r.payload.is_none()));
    }

    #[tokio::test]
    async fn test_query_by_reserved_id_field() {
        let coll = InMemoryCollection::new("readings");
        coll.insert(b"a".to_vec(), InMemoryMetadata::new()).await.unwrap();
        coll.insert(b"b".to_vec(), InMemoryMetadata::new()).await.unwrap();

        let all = drain(coll.query(&InMemoryQuery::new(), "", true, false).await.unwrap()).await;
        let mut q = InMemoryQuery::new();
        q.append(ID_FIELD, all[1].id.as_str());

        let found = drain(coll.query(&q, "", true, false).await.unwrap()).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].payload.as_deref(), Some(&b"b"[..]));
    }
}
