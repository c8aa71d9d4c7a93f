//! # rowstash-sqlx — SQLite backend for rowstash
//!
//! Implements the [`rowstash_core::Connection`] and [`rowstash_core::StoreOpener`]
//! seams on top of [SQLx](https://github.com/launchbadge/sqlx)'s SQLite driver.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SqliteStore`] | A SQLite pool holding materialized tables |
//! | [`SqliteOpener`] | Opens file-backed and in-memory stores |
//! | [`SqliteCacheGate`] | `CacheGate` wired to SQLite |
//! | [`SqlxErrorExt`] | Extension trait to convert `sqlx::Error` into `StoreError` |
//! | [`init_global_gate`] / [`global_gate`] | Process-wide gate |
//!
//! # Quick start
//!
//! ```ignore
//! use rowstash_core::prelude::*;
//! use rowstash_sqlx::{SqliteCacheGate, SqliteOpener};
//!
//! struct Planet;
//!
//! impl Materialize for Planet {
//!     fn table_name() -> &'static str { "planets" }
//!     fn rows() -> Vec<Record> {
//!         vec![Record::new().with("id", 1).with("name", "Mercury")]
//!     }
//! }
//!
//! let config = CacheConfig::load("rowstash.yaml")?;
//! let gate = SqliteCacheGate::new(SqliteOpener::from_config(&config), config);
//! let store = gate.connection(&Planet::definition()).await?;
//! let names: Vec<String> = sqlx::query_scalar("select name from planets")
//!     .fetch_all(store.pool())
//!     .await?;
//! ```

mod error;
mod opener;
mod store;

pub use error::{SqlxErrorExt, StoreResult};
pub use opener::SqliteOpener;
pub use store::{parse_datetime, SqliteStore};

use std::sync::{Arc, OnceLock};

use rowstash_core::{CacheConfig, CacheGate, Materialization, Materialize, MaterializeError, Record};

/// A [`CacheGate`] backed by SQLite.
pub type SqliteCacheGate = CacheGate<SqliteOpener>;

/// Config file read by [`global_gate`] when nothing was registered.
pub const DEFAULT_CONFIG_FILE: &str = "rowstash.yaml";

static GLOBAL_GATE: OnceLock<Arc<SqliteCacheGate>> = OnceLock::new();

/// Register the process-wide gate. Must be called before the first use of
/// [`global_gate`]; returns `false` if a gate was already set.
pub fn init_global_gate(config: CacheConfig) -> bool {
    let gate = SqliteCacheGate::new(SqliteOpener::from_config(&config), config);
    GLOBAL_GATE.set(Arc::new(gate)).is_ok()
}

/// The process-wide gate. Defaults to the configuration in
/// [`DEFAULT_CONFIG_FILE`], or built-in defaults if it cannot be loaded.
pub fn global_gate() -> Arc<SqliteCacheGate> {
    GLOBAL_GATE
        .get_or_init(|| {
            let config = CacheConfig::load(DEFAULT_CONFIG_FILE).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Using default rowstash configuration");
                CacheConfig::default()
            });
            Arc::new(SqliteCacheGate::new(SqliteOpener::from_config(&config), config))
        })
        .clone()
}

/// Make `T`'s table fresh through the process-wide gate.
pub async fn ensure_fresh<T: Materialize>() -> Result<Materialization, MaterializeError> {
    global_gate().ensure_fresh(&T::definition()).await
}

/// The store holding `T`'s fresh table, from the process-wide gate.
pub async fn connection<T: Materialize>() -> Result<SqliteStore, MaterializeError> {
    global_gate().connection(&T::definition()).await
}

/// Every row of `T`'s fresh table, from the process-wide gate.
pub async fn rows<T: Materialize>() -> Result<Vec<Record>, MaterializeError> {
    global_gate().rows(&T::definition()).await
}
