//! # rowstash-core — materialized tables for in-memory records
//!
//! An entity declares its records in code; `rowstash` materializes them into
//! a SQLite table, keeps the table in a cache file between process runs and
//! rebuilds it only when the entity's definition changed.
//!
//! This crate holds the storage-agnostic parts. The SQLite backend lives in
//! `rowstash-sqlx`.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`EntityDefinition`] / [`Materialize`] | What to materialize and how to cache it |
//! | [`infer_columns`] | Column inference from a sample record or declared schema |
//! | [`StalenessOracle`] | File-time and tracking-table freshness strategies |
//! | [`rebuild`] | Safe create + chunked insert + mark fresh |
//! | [`CacheGate`] | Binds entities to stores and rebuilds stale tables |
//! | [`Connection`] / [`StoreOpener`] | What a backing store has to provide |
//! | [`CacheConfig`] | Cache directory, file prefix, batch size |

pub mod artifact;
pub mod config;
pub mod connection;
pub mod engine;
pub mod entity;
pub mod error;
pub mod gate;
pub mod schema;
pub mod sql;
pub mod staleness;
pub mod value;

pub use config::{CacheConfig, ConfigError, RowstashConfig};
pub use connection::{Connection, StoreOpener, StoreTarget};
pub use engine::{rebuild, RebuildReport};
pub use entity::{CacheMode, EntityDefinition, Materialize, RowSource};
pub use error::{MaterializeError, Operation, StoreError};
pub use gate::{BindingMode, CacheGate, ConnectionBinding, Materialization};
pub use schema::{infer_columns, ColumnSpec, ColumnType};
pub use staleness::{FileStaleness, StalenessOracle, TrackingTableStaleness};
pub use value::{Record, Value};

pub mod prelude {
    //! Re-exports of the most commonly used types.
    pub use crate::{
        CacheConfig, CacheGate, CacheMode, ColumnType, EntityDefinition, Materialization,
        Materialize, Record, Value,
    };
}
