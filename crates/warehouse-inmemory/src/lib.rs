//! # In-Memory Message Warehouse
//!
//! This crate provides an in-memory implementation of the `MessageCollectionBackend` trait
//! from `warehouse-core`.
//!
//! **Advantages**:
//! - No I/O, no setup
//! - Great for tests and prototyping
//!
//! **Limitations**:
//! - Data is lost on restart
//! - Limited by available memory
//!
//! ## Example
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use warehouse_core::{json_message, Metadata, MessageCollection, Query};
//! use warehouse_inmemory::InMemoryDatabase;
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Temperature {
//!     temperature: f64,
//! }
//!
//! json_message!(Temperature, "sensor_msgs/Temperature", "float64 temperature");
//!
//! #[tokio::main]
//! async fn main() -> Result<(), warehouse_core::WarehouseError> {
//!     let db = InMemoryDatabase::new();
//!     let coll: MessageCollection<Temperature, _> =
//!         MessageCollection::new(db.open_collection("temperatures").await).await?;
//!
//!     let mut md = coll.create_metadata();
//!     md.append("robot", "r2");
//!     coll.insert(&Temperature { temperature: 21.5 }, md).await?;
//!
//!     let mut q = coll.create_query();
//!     q.append("robot", "r2");
//!     assert_eq!(coll.find_one(&q, false).await?.temperature, 21.5);
//!     Ok(())
//! }
//! ```
//!
//! ## Thread Safety
//!
//! Collection state lives behind `Arc<RwLock<>>`; every handle opened for the same name shares
//! it.

mod collection;
mod types;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use warehouse_core::MessageType;

pub use collection::{InMemoryCollection, InMemoryCursor};
pub use types::{InMemoryMetadata, InMemoryQuery};

use collection::CollectionState;

/// A set of named in-memory collections.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatabase {
    collections: Arc<RwLock<HashMap<String, Arc<RwLock<CollectionState>>>>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle to the named collection, creating it if needed.
    pub async fn open_collection(&self, name: &str) -> Arc<InMemoryCollection> {
        let mut collections = self.collections.write().await;
        let state = collections
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(collection = name, "Creating in-memory collection");
                Arc::new(RwLock::new(CollectionState::default()))
            })
            .clone();
        Arc::new(InMemoryCollection::with_state(name.to_string(), state))
    }

    /// Forgets the named collection. Handles opened earlier keep their data.
    pub async fn drop_collection(&self, name: &str) -> bool {
        let removed = self.collections.write().await.remove(name).is_some();
        if removed {
            info!(collection = name, "Dropped in-memory collection");
        }
        removed
    }

    /// Collection names, sorted.
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Type identity recorded for the named collection.
    pub async fn message_type(&self, name: &str) -> Option<MessageType> {
        let state = self.collections.read().await.get(name).cloned()?;
        let state = state.read().await;
        state.identity().cloned()
    }
}
