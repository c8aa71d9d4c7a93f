use rowstash_core::StoreError;

/// Extension trait for converting `sqlx::Error` into `StoreError`.
///
/// Due to Rust's orphan rules, `From<sqlx::Error> for StoreError` can't live
/// in this crate; use `.into_store_error()` instead.
pub trait SqlxErrorExt {
    fn into_store_error(self) -> StoreError;

    /// Whether the database refused a `CREATE TABLE` because the table exists.
    fn is_table_exists(&self) -> bool;
}

impl SqlxErrorExt for sqlx::Error {
    fn into_store_error(self) -> StoreError {
        match self {
            sqlx::Error::Io(err) => StoreError::Io(err),
            other => StoreError::database(other),
        }
    }

    fn is_table_exists(&self) -> bool {
        match self {
            sqlx::Error::Database(db) => db.message().contains("already exists"),
            _ => false,
        }
    }
}

/// Convenience alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;
