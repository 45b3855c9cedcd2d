//! Unit tests for MessageCollection against a scripted backend.
//!
//! Covers md5sum flag caching, insert refusal on mismatch, find_one short-circuiting and
//! metadata-only rehydration.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::backend::{MessageCollectionBackend, MessageType, RawMessage, ResultCursor};
use crate::collection::MessageCollection;
use crate::error::{Result, WarehouseError};
use crate::json_message;
use crate::message::Message;
use crate::metadata::Metadata;
use crate::query::Query;
use crate::value::{Condition, MetadataValue};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Reading {
    value: i64,
}

json_message!(Reading, "test_msgs/Reading", "int64 value");

#[derive(Debug, Clone, Default)]
struct ScriptedMetadata(BTreeMap<String, MetadataValue>);

impl Metadata for ScriptedMetadata {
    fn set_value(&mut self, name: &str, value: MetadataValue) {
        self.0.insert(name.to_string(), value);
    }

    fn get(&self, name: &str) -> Option<MetadataValue> {
        self.0.get(name).cloned()
    }

    fn field_names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, Default)]
struct ScriptedQuery(Vec<Condition>);

impl Query for ScriptedQuery {
    fn append_condition(&mut self, condition: Condition) {
        self.0.push(condition);
    }
}

struct ScriptedCursor {
    records: std::vec::IntoIter<RawMessage<ScriptedMetadata>>,
    pulls: Arc<AtomicUsize>,
    metadata_only: bool,
}

#[async_trait]
impl ResultCursor for ScriptedCursor {
    type Metadata = ScriptedMetadata;

    async fn next(&mut self) -> Result<Option<RawMessage<ScriptedMetadata>>> {
        let next = self.records.next().map(|mut raw| {
            if self.metadata_only {
                raw.payload = None;
            }
            raw
        });
        if next.is_some() {
            self.pulls.fetch_add(1, Ordering::SeqCst);
        }
        Ok(next)
    }
}

struct ScriptedBackend {
    initialize_result: bool,
    records: Mutex<Vec<RawMessage<ScriptedMetadata>>>,
    pulls: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    fn new(initialize_result: bool) -> Self {
        Self {
            initialize_result,
            records: Mutex::new(Vec::new()),
            pulls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl MessageCollectionBackend for ScriptedBackend {
    type Query = ScriptedQuery;
    type Metadata = ScriptedMetadata;
    type Cursor = ScriptedCursor;

    async fn initialize(&self, _datatype: &str, _md5sum: &str) -> Result<bool> {
        Ok(self.initialize_result)
    }

    async fn insert(&self, payload: Vec<u8>, metadata: ScriptedMetadata) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let id = format!("id-{}", records.len());
        records.push(RawMessage {
            id,
            creation_time: Utc::now(),
            metadata,
            payload: Some(payload),
        });
        Ok(())
    }

    async fn query(
        &self,
        query: &ScriptedQuery,
        _sort_by: &str,
        _ascending: bool,
        metadata_only: bool,
    ) -> Result<ScriptedCursor> {
        let matching: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|raw| query.0.iter().all(|c| c.matches(raw.metadata.0.get(&c.field))))
            .cloned()
            .collect();
        Ok(ScriptedCursor {
            records: matching.into_iter(),
            pulls: Arc::clone(&self.pulls),
            metadata_only,
        })
    }

    async fn remove_messages(&self, _query: &ScriptedQuery) -> Result<u64> {
        Ok(0)
    }

    async fn modify_metadata(&self, _query: &ScriptedQuery, _patch: &ScriptedMetadata) -> Result<()> {
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.records.lock().unwrap().len() as u64)
    }

    async fn message_type(&self) -> Result<Option<MessageType>> {
        Ok(None)
    }

    fn create_query(&self) -> ScriptedQuery {
        ScriptedQuery::default()
    }

    fn create_metadata(&self) -> ScriptedMetadata {
        ScriptedMetadata::default()
    }

    fn collection_name(&self) -> String {
        "scripted".to_string()
    }
}

async fn seeded(n: i64) -> (Arc<ScriptedBackend>, MessageCollection<Reading, ScriptedBackend>) {
    let backend = Arc::new(ScriptedBackend::new(true));
    let coll = MessageCollection::<Reading, _>::new(Arc::clone(&backend))
        .await
        .unwrap();
    for value in 0..n {
        let mut md = coll.create_metadata();
        md.append("n", value).append("group", "all");
        coll.insert(&Reading { value }, md).await.unwrap();
    }
    (backend, coll)
}

#[tokio::test]
async fn test_find_one_pulls_a_single_record() {
    let (backend, coll) = seeded(5).await;
    let mut q = coll.create_query();
    q.append("group", "all");

    let found = coll.find_one(&q, false).await.unwrap();

    assert_eq!(found.value, 0);
    assert_eq!(backend.pulls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_find_one_without_match_is_no_matching_message() {
    let (_backend, coll) = seeded(2).await;
    let mut q = coll.create_query();
    q.append("group", "none");

    let err = coll.find_one(&q, false).await.unwrap_err();
    assert!(matches!(err, WarehouseError::NoMatchingMessage(_)));
}

#[tokio::test]
async fn test_metadata_only_results_use_default_payload() {
    let (_backend, coll) = seeded(3).await;
    let q = coll.create_query();

    let results = coll.query_list(&q, true, "", true).await.unwrap();

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| *r.message() == Reading::default()));
    let ns: Vec<i64> = results.iter().filter_map(|r| r.lookup_int("n")).collect();
    assert_eq!(ns, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_mismatched_collection_refuses_insert() {
    let backend = Arc::new(ScriptedBackend::new(false));
    let coll = MessageCollection::<Reading, _>::new(Arc::clone(&backend))
        .await
        .unwrap();

    assert!(!coll.md5sum_matches());
    assert!(matches!(
        coll.ensure_md5sum_matches(),
        Err(WarehouseError::TypeMismatch { .. })
    ));

    let err = coll
        .insert(&Reading { value: 1 }, coll.create_metadata())
        .await
        .unwrap_err();
    assert!(matches!(err, WarehouseError::TypeMismatch { .. }));
    assert_eq!(coll.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_clones_share_the_backend() {
    let (backend, coll) = seeded(1).await;
    let copy = coll.clone();

    copy.insert(&Reading { value: 9 }, copy.create_metadata())
        .await
        .unwrap();

    assert_eq!(coll.count().await.unwrap(), 2);
    assert!(Arc::ptr_eq(coll.backend(), &backend));
    assert_eq!(Reading::DATATYPE, "test_msgs/Reading");
}

#[tokio::test]
async fn test_into_stream_yields_results_in_order() {
    let (_backend, coll) = seeded(4).await;
    let q = coll.create_query();

    let values: Vec<i64> = coll
        .query(&q, false, "", true)
        .await
        .unwrap()
        .into_stream()
        .map_ok(|r| r.into_message().value)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(values, vec![0, 1, 2, 3]);
}

/// **Test: A mismatched wrapper leaves the read policy to the caller.**
///
/// **Setup:** Backend reports a different md5sum and holds a record of another shape.
/// **Action:** Query metadata-only, then with payloads.
/// **Expected:** Metadata is readable; decoding the foreign payload fails with
/// `Serialization` instead of producing a default `Reading`.
#[tokio::test]
async fn test_mismatched_collection_reads_metadata_and_surfaces_decode_errors() {
    let backend = Arc::new(ScriptedBackend::new(false));
    let mut md = ScriptedMetadata::default();
    md.append("robot", "r2");
    backend.records.lock().unwrap().push(RawMessage {
        id: "foreign".to_string(),
        creation_time: Utc::now(),
        metadata: md,
        payload: Some(br#"{"temperature": 21.5}"#.to_vec()),
    });
    let coll = MessageCollection::<Reading, _>::new(Arc::clone(&backend))
        .await
        .unwrap();
    assert!(!coll.md5sum_matches());

    let q = coll.create_query();
    let meta = coll.find_one(&q, true).await.unwrap();
    assert_eq!(meta.lookup_string("robot").as_deref(), Some("r2"));

    let err = coll.find_one(&q, false).await.unwrap_err();
    assert!(matches!(err, WarehouseError::Serialization(_)));
}
