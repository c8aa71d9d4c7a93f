//! SQL text for materialization statements.
//!
//! Every identifier is validated and quoted; values are always bound
//! through `?` placeholders.

use crate::error::StoreError;
use crate::schema::{ColumnSpec, ColumnType};
use crate::value::Record;

/// Validate `ident` and wrap it in double quotes.
pub fn quote_identifier(ident: &str, kind: &'static str) -> Result<String, StoreError> {
    if !is_valid_identifier(ident) {
        return Err(StoreError::InvalidIdentifier {
            kind,
            ident: ident.to_string(),
        });
    }
    Ok(format!("\"{ident}\""))
}

fn is_valid_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// SQLite column definition for a column type.
pub fn column_definition(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Increments => "integer primary key autoincrement not null",
        ColumnType::Integer => "integer",
        ColumnType::Float => "float",
        ColumnType::String => "varchar",
        ColumnType::Text => "text",
        ColumnType::Boolean => "tinyint(1)",
        ColumnType::Date => "date",
        ColumnType::DateTime => "datetime",
    }
}

pub fn create_table(table: &str, columns: &[ColumnSpec]) -> Result<String, StoreError> {
    let table = quote_identifier(table, "table")?;
    let mut defs = Vec::with_capacity(columns.len());
    for column in columns {
        let name = quote_identifier(&column.name, "column")?;
        let mut def = format!("{name} {}", column_definition(column.column_type));
        if !column.nullable && !column.is_primary_key() {
            def.push_str(" not null");
        }
        defs.push(def);
    }
    Ok(format!("create table {table} ({})", defs.join(", ")))
}

pub fn drop_table(table: &str) -> Result<String, StoreError> {
    Ok(format!("drop table if exists {}", quote_identifier(table, "table")?))
}

/// Column list of a batch: every column of every record, in first-seen order.
/// Records lacking a column insert `NULL` for it.
pub fn batch_columns(rows: &[Record]) -> Vec<&str> {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for column in row.columns() {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
    }
    columns
}

/// Multi-row insert for `row_count` rows over `columns`.
pub fn insert_rows(table: &str, columns: &[&str], row_count: usize) -> Result<String, StoreError> {
    let table = quote_identifier(table, "table")?;
    let quoted = columns
        .iter()
        .map(|c| quote_identifier(c, "column"))
        .collect::<Result<Vec<_>, _>>()?;
    let tuple = format!("({})", vec!["?"; columns.len()].join(", "));
    let values = vec![tuple.as_str(); row_count].join(", ");
    Ok(format!(
        "insert into {table} ({}) values {values}",
        quoted.join(", ")
    ))
}

/// Insert for a record without any column.
pub fn insert_default_values(table: &str) -> Result<String, StoreError> {
    Ok(format!(
        "insert into {} default values",
        quote_identifier(table, "table")?
    ))
}

/// Select every row in insertion order.
pub fn select_all(table: &str) -> Result<String, StoreError> {
    Ok(format!(
        "select * from {} order by rowid",
        quote_identifier(table, "table")?
    ))
}

/// Columns of the tracking table.
pub fn tracking_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("table", ColumnType::String),
        ColumnSpec::new("timestamp", ColumnType::Integer),
    ]
}

pub fn select_timestamp(tracking_table: &str) -> Result<String, StoreError> {
    Ok(format!(
        "select \"timestamp\" from {} where \"table\" = ? limit 1",
        quote_identifier(tracking_table, "table")?
    ))
}

pub fn insert_timestamp(tracking_table: &str) -> Result<String, StoreError> {
    Ok(format!(
        "insert into {} (\"table\", \"timestamp\") values (?, ?)",
        quote_identifier(tracking_table, "table")?
    ))
}

pub fn update_timestamp(tracking_table: &str) -> Result<String, StoreError> {
    Ok(format!(
        "update {} set \"timestamp\" = ? where \"table\" = ?",
        quote_identifier(tracking_table, "table")?
    ))
}
