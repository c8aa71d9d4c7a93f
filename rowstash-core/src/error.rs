use std::fmt;

/// Errors reported by a backing store.
///
/// Backend crates (e.g. `rowstash-sqlx`) translate their driver errors into
/// this type so the engine can tell a lost creation race apart from a real
/// failure.
#[derive(Debug)]
pub enum StoreError {
    /// `CREATE TABLE` failed because the table already exists.
    TableExists(String),
    /// A table or column name that cannot be used as an SQL identifier.
    InvalidIdentifier { kind: &'static str, ident: String },
    Io(std::io::Error),
    Database(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Construct a `Database` variant from any driver error.
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Database(Box::new(err))
    }

    pub fn is_table_exists(&self) -> bool {
        matches!(self, StoreError::TableExists(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::TableExists(table) => write!(f, "Table already exists: {table}"),
            StoreError::InvalidIdentifier { kind, ident } => {
                write!(f, "Invalid {kind} identifier: {ident}")
            }
            StoreError::Io(err) => write!(f, "I/O error: {err}"),
            StoreError::Database(err) => write!(f, "Database error: {err}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err),
            StoreError::Database(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

/// The step of the materialization protocol that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Opening the backing store.
    Open,
    /// Dropping or creating the materialized table.
    Create,
    /// Inserting a batch of records.
    Insert,
    /// Reading or writing freshness state.
    Track,
    /// Reading the materialized table back.
    Read,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Open => "open",
            Operation::Create => "create",
            Operation::Insert => "insert",
            Operation::Track => "track",
            Operation::Read => "read",
        };
        f.write_str(name)
    }
}

/// A store failure surfaced to the caller, naming the entity and the
/// operation that failed.
#[derive(Debug)]
pub struct MaterializeError {
    pub entity: String,
    pub operation: Operation,
    pub source: StoreError,
}

impl MaterializeError {
    pub fn new(entity: &str, operation: Operation, source: StoreError) -> Self {
        Self {
            entity: entity.to_string(),
            operation,
            source,
        }
    }
}

impl fmt::Display for MaterializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Materialization of '{}' failed during {}: {}",
            self.entity, self.operation, self.source
        )
    }
}

impl std::error::Error for MaterializeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Attach entity and operation context to a store result.
pub(crate) trait StoreResultExt<T> {
    fn during(self, entity: &str, operation: Operation) -> Result<T, MaterializeError>;
}

impl<T> StoreResultExt<T> for Result<T, StoreError> {
    fn during(self, entity: &str, operation: Operation) -> Result<T, MaterializeError> {
        self.map_err(|err| MaterializeError::new(entity, operation, err))
    }
}
