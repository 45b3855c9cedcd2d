//! SQLite database: schema bootstrap and collection management.
//!
//! One database file holds any number of collections. Opening a collection is cheap; the
//! type identity row in `collections` is only written when a typed wrapper binds to it.

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::info;
use warehouse_core::{MessageType, Result};

use crate::collection::{load_message_type, SqliteCollection};
use crate::config::SqliteConfig;
use crate::sql::{database_error, write_error};
use crate::sqlite_pool::SqlitePoolManager;

#[derive(Clone)]
pub struct SqliteDatabase {
    pool_manager: SqlitePoolManager,
    config: SqliteConfig,
}

impl SqliteDatabase {
    /// Opens (or creates) the configured database and makes sure the schema exists.
    pub async fn connect(config: SqliteConfig) -> Result<Self> {
        let pool_manager = SqlitePoolManager::new(&config)
            .await
            .map_err(database_error)?;
        let db = Self {
            pool_manager,
            config,
        };
        db.init().await?;
        Ok(db)
    }

    /// Same as [`SqliteDatabase::connect`] with [`SqliteConfig::from_env`].
    pub async fn from_env() -> Result<Self> {
        Self::connect(SqliteConfig::from_env()).await
    }

    async fn init(&self) -> Result<()> {
        info!("Creating warehouse tables if not exist");

        let pool = self.pool_manager.pool();

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                datatype TEXT NOT NULL,
                md5sum TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(database_error)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                collection TEXT NOT NULL,
                creation_time INTEGER NOT NULL,
                payload BLOB NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(database_error)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS message_metadata (
                seq INTEGER NOT NULL REFERENCES messages(seq) ON DELETE CASCADE,
                key TEXT NOT NULL,
                kind TEXT NOT NULL,
                value,
                PRIMARY KEY (seq, key)
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(database_error)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_collection ON messages(collection, seq);
            CREATE INDEX IF NOT EXISTS idx_message_metadata_key ON message_metadata(key, value);
            "#,
        )
        .execute(pool)
        .await
        .map_err(database_error)?;

        info!("Warehouse tables created successfully");
        Ok(())
    }

    /// Returns a handle to the named collection. Nothing is written until the first insert
    /// or type binding.
    pub fn open_collection(&self, name: &str) -> Arc<SqliteCollection> {
        Arc::new(SqliteCollection::new(
            name.to_string(),
            self.pool_manager.pool().clone(),
            self.config.cursor_batch_size,
        ))
    }

    /// Deletes every message of the named collection and its type identity. Returns the
    /// number of messages removed.
    pub async fn drop_collection(&self, name: &str) -> Result<u64> {
        let mut tx = self.pool().begin().await.map_err(write_error)?;

        let removed = sqlx::query("DELETE FROM messages WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(write_error)?
            .rows_affected();
        sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;
        tx.commit().await.map_err(write_error)?;

        info!(collection = name, removed, "Dropped SQLite collection");
        Ok(removed)
    }

    /// Names of all collections that are bound to a type or hold messages, sorted.
    pub async fn collection_names(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT name FROM collections
            UNION
            SELECT DISTINCT collection FROM messages
            ORDER BY 1
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(database_error)?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Type identity recorded for the named collection.
    pub async fn message_type(&self, name: &str) -> Result<Option<MessageType>> {
        load_message_type(self.pool(), name).await
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        self.pool_manager.pool()
    }
}
