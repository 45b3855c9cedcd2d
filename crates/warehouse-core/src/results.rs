//! Typed query results.
//!
//! [`QueryResults`] wraps a backend cursor and decodes each raw record into a
//! [`MessageWithMetadata`]. It is single-pass: iterating again requires a new query.

use std::marker::PhantomData;
use std::ops::Deref;

use chrono::{DateTime, Utc};
use futures::Stream;

use crate::backend::{RawMessage, ResultCursor};
use crate::error::{Result, WarehouseError};
use crate::message::Message;
use crate::metadata::Metadata;

/// A decoded message together with its metadata, id and creation time.
#[derive(Debug, Clone)]
pub struct MessageWithMetadata<M, Md> {
    message: M,
    metadata: Md,
    id: String,
    creation_time: DateTime<Utc>,
}

impl<M, Md: Metadata> MessageWithMetadata<M, Md> {
    pub fn new(message: M, metadata: Md, id: String, creation_time: DateTime<Utc>) -> Self {
        Self {
            message,
            metadata,
            id,
            creation_time,
        }
    }

    pub fn message(&self) -> &M {
        &self.message
    }

    pub fn into_message(self) -> M {
        self.message
    }

    pub fn metadata(&self) -> &Md {
        &self.metadata
    }

    /// Backend-generated unique id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn lookup_string(&self, name: &str) -> Option<String> {
        self.metadata.lookup_string(name)
    }

    pub fn lookup_int(&self, name: &str) -> Option<i64> {
        self.metadata.lookup_int(name)
    }

    pub fn lookup_double(&self, name: &str) -> Option<f64> {
        self.metadata.lookup_double(name)
    }

    pub fn lookup_bool(&self, name: &str) -> Option<bool> {
        self.metadata.lookup_bool(name)
    }

    pub fn lookup_timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        self.metadata.lookup_timestamp(name)
    }
}

impl<M, Md> Deref for MessageWithMetadata<M, Md> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.message
    }
}

/// Lazy, forward-only sequence of typed results backed by a backend cursor.
///
/// Dropping it drops the cursor, which releases any backend-side state.
pub struct QueryResults<M, C> {
    cursor: C,
    metadata_only: bool,
    _message: PhantomData<fn() -> M>,
}

impl<M, C> QueryResults<M, C>
where
    M: Message,
    C: ResultCursor,
{
    pub fn new(cursor: C, metadata_only: bool) -> Self {
        Self {
            cursor,
            metadata_only,
            _message: PhantomData,
        }
    }

    /// Decodes and returns the next result, or `None` when exhausted.
    pub async fn try_next(&mut self) -> Result<Option<MessageWithMetadata<M, C::Metadata>>> {
        match self.cursor.next().await? {
            Some(raw) => self.rehydrate(raw).map(Some),
            None => Ok(None),
        }
    }

    /// Drains the remaining results, preserving order.
    pub async fn collect_all(mut self) -> Result<Vec<MessageWithMetadata<M, C::Metadata>>> {
        let mut results = Vec::new();
        while let Some(result) = self.try_next().await? {
            results.push(result);
        }
        Ok(results)
    }

    /// Adapts the results into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<MessageWithMetadata<M, C::Metadata>>> {
        futures::stream::try_unfold(self, |mut results| async move {
            let next = results.try_next().await?;
            Ok::<_, WarehouseError>(next.map(|item| (item, results)))
        })
    }

    fn rehydrate(&self, raw: RawMessage<C::Metadata>) -> Result<MessageWithMetadata<M, C::Metadata>> {
        let message = if self.metadata_only {
            M::default()
        } else {
            let payload = raw.payload.ok_or_else(|| {
                WarehouseError::Serialization(format!("message {} has no payload", raw.id))
            })?;
            M::decode(&payload)?
        };

        Ok(MessageWithMetadata::new(
            message,
            raw.metadata,
            raw.id,
            raw.creation_time,
        ))
    }
}
