#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rowstash_core::staleness::BoxFuture;
use rowstash_core::{
    ColumnSpec, Connection, Record, StalenessOracle, StoreError, StoreOpener, StoreTarget, Value,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Create `path` with the given modification time.
pub fn write_reference(path: &Path, secs: i64) {
    std::fs::write(path, b"rows").unwrap();
    rowstash_core::artifact::touch(path, secs).unwrap();
}

fn fatal(message: &str) -> StoreError {
    StoreError::database(std::io::Error::other(message.to_string()))
}

#[derive(Debug, Default)]
struct Table {
    columns: Vec<ColumnSpec>,
    rows: Vec<Record>,
    batches: Vec<usize>,
}

#[derive(Debug, Default)]
struct MockState {
    tables: HashMap<String, Table>,
    creates: HashMap<String, usize>,
    /// Next `create_table` behaves as if another process created the table.
    lose_next_create: bool,
    fail_create: Option<String>,
    fail_insert: Option<String>,
}

/// In-memory stand-in for a SQLite store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lose_next_create(&self) {
        self.state.lock().unwrap().lose_next_create = true;
    }

    pub fn fail_create(&self, message: &str) {
        self.state.lock().unwrap().fail_create = Some(message.to_string());
    }

    pub fn fail_insert(&self, message: &str) {
        self.state.lock().unwrap().fail_insert = Some(message.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_create = None;
        state.fail_insert = None;
    }

    pub fn create_count(&self, table: &str) -> usize {
        self.state.lock().unwrap().creates.get(table).copied().unwrap_or(0)
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state.lock().unwrap().tables.contains_key(table)
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        let state = self.state.lock().unwrap();
        state.tables.get(table).map(|t| t.rows.clone()).unwrap_or_default()
    }

    pub fn columns(&self, table: &str) -> Vec<ColumnSpec> {
        let state = self.state.lock().unwrap();
        state.tables.get(table).map(|t| t.columns.clone()).unwrap_or_default()
    }

    pub fn batches(&self, table: &str) -> Vec<usize> {
        let state = self.state.lock().unwrap();
        state.tables.get(table).map(|t| t.batches.clone()).unwrap_or_default()
    }

    /// Timestamp recorded for `table` in `tracking_table`.
    pub fn tracked(&self, tracking_table: &str, table: &str) -> Option<i64> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .get(tracking_table)?
            .rows
            .iter()
            .find(|row| row.get("table").and_then(Value::as_str) == Some(table))
            .and_then(|row| row.get("timestamp").and_then(Value::as_i64))
    }
}

impl Connection for MockConnection {
    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        Ok(self.has_table(table))
    }

    async fn create_table(&self, table: &str, columns: &[ColumnSpec]) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.fail_create {
            return Err(fatal(message));
        }
        if std::mem::take(&mut state.lose_next_create) {
            state.tables.insert(
                table.to_string(),
                Table {
                    columns: columns.to_vec(),
                    ..Table::default()
                },
            );
            return Err(StoreError::TableExists(table.to_string()));
        }
        if state.tables.contains_key(table) {
            return Err(StoreError::TableExists(table.to_string()));
        }
        state.tables.insert(
            table.to_string(),
            Table {
                columns: columns.to_vec(),
                ..Table::default()
            },
        );
        *state.creates.entry(table.to_string()).or_default() += 1;
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<(), StoreError> {
        self.state.lock().unwrap().tables.remove(table);
        Ok(())
    }

    async fn insert_rows(&self, table: &str, rows: &[Record]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.fail_insert {
            return Err(fatal(message));
        }
        let target = state
            .tables
            .get_mut(table)
            .ok_or_else(|| fatal(&format!("no such table: {table}")))?;
        target.rows.extend_from_slice(rows);
        target.batches.push(rows.len());
        Ok(rows.len() as u64)
    }

    async fn fetch_all(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| fatal(&format!("no such table: {table}")))
    }

    async fn read_timestamp(
        &self,
        tracking_table: &str,
        table: &str,
    ) -> Result<Option<i64>, StoreError> {
        if !self.has_table(tracking_table) {
            return Err(fatal(&format!("no such table: {tracking_table}")));
        }
        Ok(self.tracked(tracking_table, table))
    }

    async fn insert_timestamp(
        &self,
        tracking_table: &str,
        table: &str,
        timestamp: i64,
    ) -> Result<(), StoreError> {
        let row = Record::new().with("table", table).with("timestamp", timestamp);
        self.insert_rows(tracking_table, &[row]).await.map(|_| ())
    }

    async fn update_timestamp(
        &self,
        tracking_table: &str,
        table: &str,
        timestamp: i64,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        let target = state
            .tables
            .get_mut(tracking_table)
            .ok_or_else(|| fatal(&format!("no such table: {tracking_table}")))?;
        let mut updated = 0;
        for row in target
            .rows
            .iter_mut()
            .filter(|row| row.get("table").and_then(Value::as_str) == Some(table))
        {
            row.set("timestamp", timestamp);
            updated += 1;
        }
        Ok(updated)
    }
}

/// Opens [`MockConnection`]s. File targets keep their store across gates,
/// the way a file on disk outlives a process.
#[derive(Debug, Clone, Default)]
pub struct MockOpener {
    files: Arc<Mutex<HashMap<StoreTarget, MockConnection>>>,
    unopenable: Arc<Mutex<Vec<PathBuf>>>,
    opened: Arc<AtomicUsize>,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store behind a file target, created if nothing opened it yet.
    pub fn store(&self, path: &Path) -> MockConnection {
        self.files
            .lock()
            .unwrap()
            .entry(StoreTarget::File(path.to_path_buf()))
            .or_default()
            .clone()
    }

    /// Make opening `path` fail the way SQLite does in a directory it cannot
    /// write to.
    pub fn fail_open(&self, path: &Path) {
        self.unopenable.lock().unwrap().push(path.to_path_buf());
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl StoreOpener for MockOpener {
    type Connection = MockConnection;

    async fn open(&self, target: &StoreTarget) -> Result<MockConnection, StoreError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        match target {
            StoreTarget::Memory => Ok(MockConnection::new()),
            StoreTarget::File(path) if self.unopenable.lock().unwrap().contains(path) => {
                Err(fatal("unable to open database file"))
            }
            StoreTarget::File(path) => Ok(self.store(path)),
        }
    }
}

/// Oracle counting how often it was told about a rebuild.
#[derive(Debug, Default)]
pub struct CountingOracle {
    pub fresh_marks: AtomicUsize,
}

impl StalenessOracle for CountingOracle {
    fn is_fresh(&self) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async { Ok(false) })
    }

    fn mark_fresh(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        self.fresh_marks.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }

    fn mark_stale(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async { Ok(()) })
    }
}
