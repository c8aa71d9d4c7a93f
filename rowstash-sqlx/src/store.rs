use chrono::{DateTime, Utc};
use rowstash_core::sql;
use rowstash_core::{ColumnSpec, Connection, Record, StoreError, Value};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteColumn, SqlitePool, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};

use crate::error::{SqlxErrorExt, StoreResult};

/// A SQLite database holding materialized tables.
///
/// Cloning is cheap: clones share the same `sqlx::SqlitePool`, which the
/// query layer can use directly through [`SqliteStore::pool`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the underlying pool reference.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Names of the columns of `table`, in declaration order.
    pub async fn column_names(&self, table: &str) -> StoreResult<Vec<String>> {
        let stmt = format!(
            "select name from pragma_table_info({})",
            quote_literal(table)
        );
        sqlx::query_scalar::<_, String>(&stmt)
            .fetch_all(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_store_error)
    }

    pub async fn count(&self, table: &str) -> StoreResult<i64> {
        let stmt = format!(
            "select count(*) from {}",
            sql::quote_identifier(table, "table")?
        );
        sqlx::query_scalar::<_, i64>(&stmt)
            .fetch_one(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_store_error)
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Integer(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::DateTime(dt) => query.bind(*dt),
        Value::Null => query.bind(None::<String>),
    }
}

/// Decode a row by the storage class of each value. Text stored in a column
/// declared `datetime` comes back as [`Value::DateTime`] when it parses.
fn decode_row(row: &SqliteRow) -> Result<Record, sqlx::Error> {
    let mut record = Record::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let storage_class = raw.type_info().name().to_string();
            match storage_class.as_str() {
                "INTEGER" => Value::Integer(row.try_get::<i64, _>(idx)?),
                "REAL" => Value::Float(row.try_get::<f64, _>(idx)?),
                "BLOB" => {
                    let bytes = row.try_get::<Vec<u8>, _>(idx)?;
                    Value::Text(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => {
                    let text = Value::Text(row.try_get::<String, _>(idx)?);
                    if is_datetime_column(column) {
                        parse_datetime(&text).map(Value::DateTime).unwrap_or(text)
                    } else {
                        text
                    }
                }
            }
        };
        record.set(column.name(), value);
    }
    Ok(record)
}

fn is_datetime_column(column: &SqliteColumn) -> bool {
    matches!(
        column.type_info().name().to_ascii_uppercase().as_str(),
        "DATETIME" | "TIMESTAMP"
    )
}

/// Parse a date-time column value written by [`SqliteStore`].
pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::DateTime(dt) => Some(*dt),
        Value::Text(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z")
                    .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                    .map(|naive| naive.and_utc())
                    .ok()
            }),
        _ => None,
    }
}

impl Connection for SqliteStore {
    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let found = sqlx::query_scalar::<_, i64>(
            "select 1 from sqlite_master where type = 'table' and name = ?",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await
        .map_err(SqlxErrorExt::into_store_error)?;
        Ok(found.is_some())
    }

    async fn create_table(&self, table: &str, columns: &[ColumnSpec]) -> Result<(), StoreError> {
        let stmt = sql::create_table(table, columns)?;
        match sqlx::query(&stmt).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_table_exists() => Err(StoreError::TableExists(table.to_string())),
            Err(e) => Err(e.into_store_error()),
        }
    }

    async fn drop_table(&self, table: &str) -> Result<(), StoreError> {
        let stmt = sql::drop_table(table)?;
        sqlx::query(&stmt)
            .execute(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_store_error)?;
        Ok(())
    }

    async fn insert_rows(&self, table: &str, rows: &[Record]) -> Result<u64, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let columns = sql::batch_columns(rows);
        if columns.is_empty() {
            let stmt = sql::insert_default_values(table)?;
            let mut inserted = 0;
            for _ in rows {
                inserted += sqlx::query(&stmt)
                    .execute(&self.pool)
                    .await
                    .map_err(SqlxErrorExt::into_store_error)?
                    .rows_affected();
            }
            return Ok(inserted);
        }

        let stmt = sql::insert_rows(table, &columns, rows.len())?;
        let mut query = sqlx::query(&stmt);
        for row in rows {
            for column in &columns {
                query = bind_value(query, row.get(column).unwrap_or(&Value::Null));
            }
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_store_error)?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        let stmt = sql::select_all(table)?;
        let rows = sqlx::query(&stmt)
            .fetch_all(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_store_error)?;
        rows.iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(SqlxErrorExt::into_store_error)
    }

    async fn read_timestamp(
        &self,
        tracking_table: &str,
        table: &str,
    ) -> Result<Option<i64>, StoreError> {
        let stmt = sql::select_timestamp(tracking_table)?;
        sqlx::query_scalar::<_, i64>(&stmt)
            .bind(table)
            .fetch_optional(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_store_error)
    }

    async fn insert_timestamp(
        &self,
        tracking_table: &str,
        table: &str,
        timestamp: i64,
    ) -> Result<(), StoreError> {
        let stmt = sql::insert_timestamp(tracking_table)?;
        sqlx::query(&stmt)
            .bind(table)
            .bind(timestamp)
            .execute(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_store_error)?;
        Ok(())
    }

    async fn update_timestamp(
        &self,
        tracking_table: &str,
        table: &str,
        timestamp: i64,
    ) -> Result<u64, StoreError> {
        let stmt = sql::update_timestamp(tracking_table)?;
        let result = sqlx::query(&stmt)
            .bind(timestamp)
            .bind(table)
            .execute(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_store_error)?;
        Ok(result.rows_affected())
    }
}
