//! Column inference for materialized tables.
//!
//! A table's columns come from the first record of an entity (or from its
//! declared schema when it has no records). Inference never fails: a value
//! whose kind has no better mapping becomes a `string` column.

use std::fmt;
use std::str::FromStr;

use crate::entity::EntityDefinition;
use crate::value::{Record, Value};

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Column types a materialized table can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Auto-incrementing integer primary key.
    Increments,
    Integer,
    Float,
    String,
    Text,
    Boolean,
    Date,
    DateTime,
}

impl ColumnType {
    /// Map a sample value to the column type that stores it.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Integer(_) => ColumnType::Integer,
            Value::Float(_) => ColumnType::Float,
            Value::Text(_) => ColumnType::String,
            Value::DateTime(_) => ColumnType::DateTime,
            Value::Null => ColumnType::String,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Increments => "increments",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::String => "string",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "dateTime",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses declared type names. Unknown names fall back to `string`.
impl FromStr for ColumnType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s.to_ascii_lowercase().as_str() {
            "increments" => ColumnType::Increments,
            "integer" | "int" | "biginteger" | "bigint" | "smallinteger" | "tinyinteger" => {
                ColumnType::Integer
            }
            "float" | "double" | "decimal" | "real" => ColumnType::Float,
            "text" | "longtext" | "mediumtext" => ColumnType::Text,
            "boolean" | "bool" => ColumnType::Boolean,
            "date" => ColumnType::Date,
            "datetime" | "timestamp" => ColumnType::DateTime,
            _ => ColumnType::String,
        };
        Ok(ty)
    }
}

impl From<&str> for ColumnType {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(ty) => ty,
            Err(never) => match never {},
        }
    }
}

/// One column of a table to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl ColumnSpec {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            nullable: column_type != ColumnType::Increments,
        }
    }

    pub fn increments(name: &str) -> Self {
        Self::new(name, ColumnType::Increments)
    }

    pub fn is_primary_key(&self) -> bool {
        self.column_type == ColumnType::Increments
    }
}

/// Infer the columns of `entity`'s table from `sample` (normally its first
/// record) and its declared schema.
pub fn infer_columns(entity: &EntityDefinition, sample: Option<&Record>) -> Vec<ColumnSpec> {
    let declared = entity.declared_schema();
    let primary_key = entity.primary_key_name();

    let mut names: Vec<&str> = Vec::new();
    if let Some(sample) = sample {
        names.extend(sample.columns());
    }
    for (name, _) in declared {
        if !names.contains(&name.as_str()) {
            names.push(name);
        }
    }

    let mut columns = Vec::with_capacity(names.len() + 3);
    if entity.is_incrementing() && !names.contains(&primary_key) {
        columns.push(ColumnSpec::increments(primary_key));
    }

    for name in &names {
        let column_type = declared
            .iter()
            .find(|(declared_name, _)| declared_name == name)
            .map(|(_, ty)| *ty)
            .or_else(|| sample.and_then(|s| s.get(name)).map(ColumnType::infer))
            .unwrap_or(ColumnType::String);

        if *name == primary_key && column_type == ColumnType::Integer {
            columns.push(ColumnSpec::increments(name));
            continue;
        }
        columns.push(ColumnSpec::new(name, column_type));
    }

    // A table needs at least one column.
    if columns.is_empty() {
        columns.push(ColumnSpec::increments(primary_key));
    }

    if entity.uses_timestamps() {
        for stamp in [CREATED_AT, UPDATED_AT] {
            if !columns.iter().any(|c| c.name == stamp) {
                columns.push(ColumnSpec::new(stamp, ColumnType::DateTime));
            }
        }
    }

    columns
}
