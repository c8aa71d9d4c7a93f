use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::schema::ColumnSpec;
use crate::value::Record;

/// Statements the materialization core needs from a backing store.
///
/// Every method is a single statement against the store. Uses RPITIT, so
/// implementations are plain `async fn`s.
pub trait Connection: Clone + Send + Sync + 'static {
    fn table_exists(&self, table: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Create `table`. Must report an existing table as [`StoreError::TableExists`].
    fn create_table(
        &self,
        table: &str,
        columns: &[ColumnSpec],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Drop `table`. A missing table is not an error.
    fn drop_table(&self, table: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Insert `rows` as one statement. Returns the number of rows inserted.
    fn insert_rows(
        &self,
        table: &str,
        rows: &[Record],
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Every row of `table` in insertion order.
    fn fetch_all(&self, table: &str) -> impl Future<Output = Result<Vec<Record>, StoreError>> + Send;

    /// Timestamp of `table`'s row in `tracking_table`, if the row exists.
    fn read_timestamp(
        &self,
        tracking_table: &str,
        table: &str,
    ) -> impl Future<Output = Result<Option<i64>, StoreError>> + Send;

    fn insert_timestamp(
        &self,
        tracking_table: &str,
        table: &str,
        timestamp: i64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns the number of rows updated.
    fn update_timestamp(
        &self,
        tracking_table: &str,
        table: &str,
        timestamp: i64,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// Where a store lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreTarget {
    /// A private in-memory database that lives as long as the connection.
    Memory,
    File(PathBuf),
}

impl StoreTarget {
    pub fn path(&self) -> Option<&Path> {
        match self {
            StoreTarget::Memory => None,
            StoreTarget::File(path) => Some(path),
        }
    }
}

impl fmt::Display for StoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreTarget::Memory => f.write_str(":memory:"),
            StoreTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Opens connections for the cache gate.
pub trait StoreOpener: Send + Sync + 'static {
    type Connection: Connection;

    fn open(
        &self,
        target: &StoreTarget,
    ) -> impl Future<Output = Result<Self::Connection, StoreError>> + Send;
}
