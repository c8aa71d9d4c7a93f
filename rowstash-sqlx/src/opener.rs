use std::str::FromStr;
use std::time::Duration;

use rowstash_core::{CacheConfig, StoreError, StoreOpener, StoreTarget};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::error::SqlxErrorExt;
use crate::store::SqliteStore;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens SQLite pools for cache files and transient in-memory stores.
#[derive(Debug, Clone)]
pub struct SqliteOpener {
    pool_size: u32,
    busy_timeout: Duration,
}

impl Default for SqliteOpener {
    fn default() -> Self {
        Self {
            pool_size: rowstash_core::config::DEFAULT_POOL_SIZE,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl SqliteOpener {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            pool_size: config.pool_size.max(1),
            ..Self::default()
        }
    }

    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    /// How long a connection waits on a lock held by another process.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn pool_size(&self) -> u32 {
        self.pool_size
    }
}

impl StoreOpener for SqliteOpener {
    type Connection = SqliteStore;

    async fn open(&self, target: &StoreTarget) -> Result<SqliteStore, StoreError> {
        let pool = match target {
            // Each in-memory connection is its own database: pin a single one.
            StoreTarget::Memory => {
                let options = SqliteConnectOptions::from_str("sqlite::memory:")
                    .map_err(SqlxErrorExt::into_store_error)?;
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(options)
                    .await
            }
            StoreTarget::File(path) => {
                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Delete)
                    .busy_timeout(self.busy_timeout);
                SqlitePoolOptions::new()
                    .max_connections(self.pool_size)
                    .connect_with(options)
                    .await
            }
        }
        .map_err(SqlxErrorExt::into_store_error)?;

        tracing::debug!(store = %target, pool_size = self.pool_size, "SQLite store opened");
        Ok(SqliteStore::new(pool))
    }
}
