//! # SQLite Message Warehouse
//!
//! Persistent implementation of the `MessageCollectionBackend` trait from `warehouse-core`,
//! built on sqlx.
//!
//! ## Modules
//!
//! - [`config`] – `SqliteConfig`, loaded from `WAREHOUSE_*` environment variables
//! - `database` – `SqliteDatabase`: schema bootstrap, open/drop/list collections
//! - `collection` – `SqliteCollection`, the backend implementation
//! - `cursor` – `SqliteCursor`, batched lazy results
//! - `sql` – condition and sort compilation, value encoding
//! - `sqlite_pool` – `SqlitePoolManager`
//! - `types` – `SqliteQuery`, `SqliteMetadata`
//!
//! ## Schema
//!
//! ```text
//! collections      (name PK, datatype, md5sum)
//! messages         (seq PK AUTOINCREMENT, id UNIQUE, collection, creation_time, payload)
//! message_metadata (seq FK ON DELETE CASCADE, key, kind, value, PK(seq, key))
//! ```
//!
//! `seq` is the insertion order and the tie-breaker of every sort.
//!
//! ## Example
//!
//! ```rust,no_run
//! use serde::{Deserialize, Serialize};
//! use warehouse_core::{json_message, Metadata, MessageCollection, Query};
//! use warehouse_sqlite::{SqliteConfig, SqliteDatabase};
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
//!     let db = SqliteDatabase::connect(SqliteConfig::new("warehouse.db")).await?;
//!     let coll: MessageCollection<Temperature, _> =
//!         MessageCollection::new(db.open_collection("temperatures")).await?;
//!
//!     let mut md = coll.create_metadata();
//!     md.append("robot", "r2");
//!     coll.insert(&Temperature { temperature: 21.5 }, md).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
mod collection;
mod cursor;
mod database;
mod sql;
mod sqlite_pool;
mod types;

pub use collection::SqliteCollection;
pub use config::SqliteConfig;
pub use cursor::SqliteCursor;
pub use database::SqliteDatabase;
pub use sqlite_pool::SqlitePoolManager;
pub use types::{SqliteMetadata, SqliteQuery};
