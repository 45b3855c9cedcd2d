//! Batched query cursor.
//!
//! The cursor is created with the ordered sequence numbers of every matching message. Rows
//! are then fetched in batches that start at one row and double up to `batch_size`, so a
//! caller that stops after the first result reads a single payload. Messages deleted after
//! the query was issued are skipped.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use warehouse_core::{Metadata, RawMessage, Result, ResultCursor, WarehouseError};

use crate::sql::{database_error, decode_value, placeholders};
use crate::types::SqliteMetadata;

/// Keeps `IN (...)` lists well below SQLite's bind parameter limit.
const MAX_BATCH_SIZE: usize = 500;

pub struct SqliteCursor {
    pool: SqlitePool,
    collection: String,
    pending: VecDeque<i64>,
    buffer: VecDeque<RawMessage<SqliteMetadata>>,
    batch_size: usize,
    next_batch: usize,
    metadata_only: bool,
}

impl SqliteCursor {
    pub(crate) fn new(
        pool: SqlitePool,
        collection: String,
        seqs: Vec<i64>,
        batch_size: usize,
        metadata_only: bool,
    ) -> Self {
        Self {
            pool,
            collection,
            pending: seqs.into(),
            buffer: VecDeque::new(),
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            next_batch: 1,
            metadata_only,
        }
    }

    /// Messages not yet returned (fetched or not).
    pub fn remaining(&self) -> usize {
        self.pending.len() + self.buffer.len()
    }

    async fn fill(&mut self) -> Result<()> {
        let take = self.next_batch.min(self.pending.len());
        let batch: Vec<i64> = self.pending.drain(..take).collect();
        self.next_batch = (self.next_batch * 2).min(self.batch_size);

        let columns = if self.metadata_only {
            "seq, id, creation_time"
        } else {
            "seq, id, creation_time, payload"
        };
        let sql = format!(
            "SELECT {} FROM messages WHERE seq IN ({})",
            columns,
            placeholders(batch.len())
        );
        let rows = batch
            .iter()
            .fold(sqlx::query(&sql), |q, seq| q.bind(*seq))
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        let mut metadata = load_metadata(&self.pool, &batch).await?;
        let mut fetched = HashMap::with_capacity(rows.len());
        for row in rows {
            let seq: i64 = row.try_get("seq").map_err(database_error)?;
            let id: String = row.try_get("id").map_err(database_error)?;
            let micros: i64 = row.try_get("creation_time").map_err(database_error)?;
            let creation_time = DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| {
                WarehouseError::Database(format!("creation_time out of range for {}", id))
            })?;
            let payload = if self.metadata_only {
                None
            } else {
                Some(row.try_get::<Vec<u8>, _>("payload").map_err(database_error)?)
            };
            fetched.insert(seq, (id, creation_time, payload));
        }

        for seq in &batch {
            if let Some((id, creation_time, payload)) = fetched.remove(seq) {
                self.buffer.push_back(RawMessage {
                    id,
                    creation_time,
                    metadata: metadata.remove(seq).unwrap_or_default(),
                    payload,
                });
            }
        }

        debug!(
            collection = %self.collection,
            requested = batch.len(),
            fetched = self.buffer.len(),
            "Fetched cursor batch"
        );
        Ok(())
    }
}

#[async_trait]
impl ResultCursor for SqliteCursor {
    type Metadata = SqliteMetadata;

    async fn next(&mut self) -> Result<Option<RawMessage<SqliteMetadata>>> {
        loop {
            if let Some(raw) = self.buffer.pop_front() {
                return Ok(Some(raw));
            }
            if self.pending.is_empty() {
                return Ok(None);
            }
            self.fill().await?;
        }
    }
}

impl Drop for SqliteCursor {
    fn drop(&mut self) {
        let remaining = self.remaining();
        if remaining > 0 {
            debug!(collection = %self.collection, remaining, "Cursor released before exhaustion");
        }
    }
}

/// Metadata of the given messages, keyed by sequence number.
pub(crate) async fn load_metadata(
    pool: &SqlitePool,
    seqs: &[i64],
) -> Result<HashMap<i64, SqliteMetadata>> {
    let mut metadata: HashMap<i64, SqliteMetadata> = HashMap::new();
    if seqs.is_empty() {
        return Ok(metadata);
    }

    let sql = format!(
        "SELECT seq, key, kind, value FROM message_metadata WHERE seq IN ({})",
        placeholders(seqs.len())
    );
    let rows = seqs
        .iter()
        .fold(sqlx::query(&sql), |q, seq| q.bind(*seq))
        .fetch_all(pool)
        .await
        .map_err(database_error)?;

    for row in rows {
        let seq: i64 = row.try_get("seq").map_err(database_error)?;
        let key: String = row.try_get("key").map_err(database_error)?;
        let value = decode_value(&row)?;
        metadata.entry(seq).or_default().set_value(&key, value);
    }
    Ok(metadata)
}
