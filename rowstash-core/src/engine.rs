//! The rebuild protocol: safe create, chunked insert, mark fresh.

use crate::connection::Connection;
use crate::entity::EntityDefinition;
use crate::error::{MaterializeError, Operation, StoreError, StoreResultExt};
use crate::schema::{infer_columns, ColumnSpec};
use crate::staleness::StalenessOracle;

/// Outcome of one [`rebuild`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    pub table: String,
    pub columns: Vec<ColumnSpec>,
    pub rows_inserted: u64,
    /// Size of each insert statement, in order.
    pub batches: Vec<usize>,
    /// `true` when another process created the table first; nothing was
    /// inserted by this call.
    pub race_lost: bool,
}

enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Drop `table` if present, then create it. A concurrent creator winning
/// between the two steps is reported as [`CreateOutcome::AlreadyExists`].
async fn create_table_safely<C: Connection>(
    connection: &C,
    table: &str,
    columns: &[ColumnSpec],
) -> Result<CreateOutcome, StoreError> {
    if connection.table_exists(table).await? {
        connection.drop_table(table).await?;
    }

    match connection.create_table(table, columns).await {
        Ok(()) => Ok(CreateOutcome::Created),
        Err(StoreError::TableExists(_)) => Ok(CreateOutcome::AlreadyExists),
        Err(e) => Err(e),
    }
}

/// Rebuild the materialized table of `entity` from its current records and
/// mark it fresh.
///
/// `default_batch_size` applies when the entity does not set its own.
pub async fn rebuild<C: Connection>(
    connection: &C,
    entity: &EntityDefinition,
    oracle: &dyn StalenessOracle,
    default_batch_size: usize,
) -> Result<RebuildReport, MaterializeError> {
    let identity = entity.identity();
    let table = entity.table_name();
    let rows = entity.source().load();
    let columns = infer_columns(entity, rows.first());

    let outcome = create_table_safely(connection, table, &columns)
        .await
        .during(identity, Operation::Create)?;

    if let CreateOutcome::AlreadyExists = outcome {
        tracing::debug!(
            entity = identity,
            table,
            "Table created concurrently by another process, leaving it in place"
        );
        return Ok(RebuildReport {
            table: table.to_string(),
            columns,
            rows_inserted: 0,
            batches: Vec::new(),
            race_lost: true,
        });
    }

    let batch_size = entity.insert_batch_size(default_batch_size);
    let mut batches = Vec::with_capacity(rows.len().div_ceil(batch_size));
    let mut rows_inserted = 0;
    for chunk in rows.chunks(batch_size).filter(|c| !c.is_empty()) {
        rows_inserted += connection
            .insert_rows(table, chunk)
            .await
            .during(identity, Operation::Insert)?;
        batches.push(chunk.len());
    }

    oracle.mark_fresh().await.during(identity, Operation::Track)?;

    tracing::info!(
        entity = identity,
        table,
        rows = rows_inserted,
        batches = batches.len(),
        "Materialized table rebuilt"
    );

    Ok(RebuildReport {
        table: table.to_string(),
        columns,
        rows_inserted,
        batches,
        race_lost: false,
    })
}
