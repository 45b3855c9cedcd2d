//! SQLite backend configuration, loaded from environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `WAREHOUSE_DATABASE_URL` | `sqlite::memory:` |
//! | `WAREHOUSE_CURSOR_BATCH_SIZE` | `64` |
//! | `WAREHOUSE_MAX_CONNECTIONS` | `5` |

use std::env;

pub const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";
pub const DEFAULT_CURSOR_BATCH_SIZE: usize = 64;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// File path, `sqlite://` URL or `sqlite::memory:`.
    pub database_url: String,
    /// Rows fetched per round trip by query cursors.
    pub cursor_batch_size: usize,
    /// Pool size for file databases; in-memory databases always use one connection.
    pub max_connections: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            cursor_batch_size: DEFAULT_CURSOR_BATCH_SIZE,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl SqliteConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from environment variables; unset or unparsable values fall back
    /// to the defaults.
    pub fn from_env() -> Self {
        let database_url =
            env::var("WAREHOUSE_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let cursor_batch_size = env::var("WAREHOUSE_CURSOR_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_CURSOR_BATCH_SIZE);
        let max_connections = env::var("WAREHOUSE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);

        Self {
            database_url,
            cursor_batch_size,
            max_connections,
        }
    }

    pub fn with_cursor_batch_size(mut self, cursor_batch_size: usize) -> Self {
        self.cursor_batch_size = cursor_batch_size.max(1);
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}
