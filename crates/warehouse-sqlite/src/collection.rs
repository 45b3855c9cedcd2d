//! SQLite collection: the `MessageCollectionBackend` implementation.
//!
//! All collections of a database share the `messages` and `message_metadata` tables; rows
//! are scoped by the `collection` column. Writes that touch more than one row run in a
//! transaction, so a failed insert or patch leaves nothing behind.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;
use warehouse_core::{
    validate_metadata, Metadata, MessageCollectionBackend, MessageType, Result, WarehouseError,
};

use crate::cursor::SqliteCursor;
use crate::sql::{
    bind_param, bind_params, compile_filter, compile_order, database_error, encode_value,
    write_error,
};
use crate::types::{SqliteMetadata, SqliteQuery};

/// A named collection stored in a SQLite database.
#[derive(Clone)]
pub struct SqliteCollection {
    name: String,
    pool: SqlitePool,
    cursor_batch_size: usize,
}

impl SqliteCollection {
    pub(crate) fn new(name: String, pool: SqlitePool, cursor_batch_size: usize) -> Self {
        Self {
            name,
            pool,
            cursor_batch_size,
        }
    }

    /// Sequence numbers of the messages matching `query`, in result order.
    async fn matching_seqs(
        &self,
        conn: &mut SqliteConnection,
        query: &SqliteQuery,
        sort_by: &str,
        ascending: bool,
        limit: Option<u32>,
    ) -> std::result::Result<Vec<i64>, sqlx::Error> {
        let filter = compile_filter(&self.name, query);
        let (order, order_params) = compile_order(sort_by, ascending);
        let mut sql = format!("SELECT m.seq FROM messages m WHERE {} {}", filter.sql, order);
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let statement = bind_params(sqlx::query(&sql), &filter.params);
        let rows = bind_params(statement, &order_params)
            .fetch_all(&mut *conn)
            .await?;
        rows.iter().map(|row| row.try_get::<i64, _>("seq")).collect()
    }
}

/// Upserts every key of `metadata` for message `seq`.
async fn write_metadata(
    conn: &mut SqliteConnection,
    seq: i64,
    metadata: &SqliteMetadata,
) -> std::result::Result<(), sqlx::Error> {
    for (key, value) in metadata.entries() {
        let statement = sqlx::query(
            r#"
            INSERT INTO message_metadata (seq, key, kind, value) VALUES (?, ?, ?, ?)
            ON CONFLICT(seq, key) DO UPDATE SET kind = excluded.kind, value = excluded.value
            "#,
        )
        .bind(seq)
        .bind(key)
        .bind(value.kind());
        bind_param(statement, &encode_value(&value))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Identity recorded for `collection`, if any.
pub(crate) async fn load_message_type(
    pool: &SqlitePool,
    collection: &str,
) -> Result<Option<MessageType>> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT datatype, md5sum FROM collections WHERE name = ?")
            .bind(collection)
            .fetch_optional(pool)
            .await
            .map_err(database_error)?;

    Ok(row.map(|(datatype, md5sum)| MessageType { datatype, md5sum }))
}

#[async_trait]
impl MessageCollectionBackend for SqliteCollection {
    type Query = SqliteQuery;
    type Metadata = SqliteMetadata;
    type Cursor = SqliteCursor;

    async fn initialize(&self, datatype: &str, md5sum: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        let stored: Option<(String, String)> =
            sqlx::query_as("SELECT datatype, md5sum FROM collections WHERE name = ?")
                .bind(&self.name)
                .fetch_optional(&mut *tx)
                .await
                .map_err(database_error)?;

        if let Some((stored_datatype, stored_md5sum)) = stored {
            if stored_md5sum == md5sum {
                return Ok(true);
            }

            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM messages WHERE collection = ?")
                    .bind(&self.name)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(database_error)?;
            if count > 0 {
                warn!(
                    collection = %self.name,
                    stored_datatype = %stored_datatype,
                    stored_md5sum = %stored_md5sum,
                    datatype,
                    md5sum,
                    count,
                    "md5sum mismatch for non-empty collection"
                );
                return Ok(false);
            }
        }

        sqlx::query(
            r#"
            INSERT INTO collections (name, datatype, md5sum) VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET datatype = excluded.datatype, md5sum = excluded.md5sum
            "#,
        )
        .bind(&self.name)
        .bind(datatype)
        .bind(md5sum)
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;
        tx.commit().await.map_err(write_error)?;

        info!(collection = %self.name, datatype, md5sum, "Binding collection type");
        Ok(true)
    }

    async fn insert(&self, payload: Vec<u8>, metadata: SqliteMetadata) -> Result<()> {
        validate_metadata(&metadata)?;

        let id = Uuid::new_v4().to_string();
        let creation_time = Utc::now();
        let size = payload.len();

        let mut tx = self.pool.begin().await.map_err(write_error)?;
        let result = sqlx::query(
            "INSERT INTO messages (id, collection, creation_time, payload) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&self.name)
        .bind(creation_time.timestamp_micros())
        .bind(payload)
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;

        write_metadata(&mut *tx, result.last_insert_rowid(), &metadata)
            .await
            .map_err(write_error)?;
        tx.commit().await.map_err(write_error)?;

        debug!(collection = %self.name, id = %id, size, "Inserted message");
        Ok(())
    }

    async fn query(
        &self,
        query: &SqliteQuery,
        sort_by: &str,
        ascending: bool,
        metadata_only: bool,
    ) -> Result<SqliteCursor> {
        let mut conn = self.pool.acquire().await.map_err(database_error)?;
        let seqs = self
            .matching_seqs(&mut *conn, query, sort_by, ascending, None)
            .await
            .map_err(database_error)?;

        debug!(collection = %self.name, matches = seqs.len(), "SQLite query resolved");
        Ok(SqliteCursor::new(
            self.pool.clone(),
            self.name.clone(),
            seqs,
            self.cursor_batch_size,
            metadata_only,
        ))
    }

    async fn remove_messages(&self, query: &SqliteQuery) -> Result<u64> {
        let filter = compile_filter(&self.name, query);
        let sql = format!(
            "DELETE FROM messages WHERE seq IN (SELECT m.seq FROM messages m WHERE {})",
            filter.sql
        );

        let result = bind_params(sqlx::query(&sql), &filter.params)
            .execute(&self.pool)
            .await
            .map_err(write_error)?;

        let removed = result.rows_affected();
        info!(collection = %self.name, removed, "Removed messages");
        Ok(removed)
    }

    async fn modify_metadata(&self, query: &SqliteQuery, patch: &SqliteMetadata) -> Result<()> {
        validate_metadata(patch)?;

        let mut tx = self.pool.begin().await.map_err(database_error)?;
        let seqs = self
            .matching_seqs(&mut *tx, query, "", true, Some(1))
            .await
            .map_err(database_error)?;

        let seq = match seqs.first() {
            Some(seq) => *seq,
            None => {
                return Err(WarehouseError::NoMatchingMessage(format!(
                    "no message in {} matches {:?}",
                    self.name, query
                )))
            }
        };

        write_metadata(&mut *tx, seq, patch)
            .await
            .map_err(write_error)?;
        tx.commit().await.map_err(write_error)?;

        debug!(collection = %self.name, seq, keys = ?patch.field_names(), "Modified metadata");
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE collection = ?")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(count as u64)
    }

    async fn message_type(&self) -> Result<Option<MessageType>> {
        load_message_type(&self.pool, &self.name).await
    }

    fn create_query(&self) -> SqliteQuery {
        SqliteQuery::new()
    }

    fn create_metadata(&self) -> SqliteMetadata {
        SqliteMetadata::new()
    }

    fn collection_name(&self) -> String {
        self.name.clone()
    }
}
