//! Freshness strategies.
//!
//! An oracle is chosen once, when an entity is bound to its store:
//! [`FileStaleness`] for private cache files, [`TrackingTableStaleness`] for
//! shared and transient stores.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::artifact;
use crate::connection::Connection;
use crate::error::StoreError;
use crate::sql;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Decides whether a materialized table still reflects its source.
///
/// Object-safe so a binding can hold whichever strategy it was created with.
pub trait StalenessOracle: Send + Sync + 'static {
    fn is_fresh(&self) -> BoxFuture<'_, Result<bool, StoreError>>;

    /// Record that the table was just rebuilt from the current source.
    fn mark_fresh(&self) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Force the next freshness check to fail.
    fn mark_stale(&self) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Freshness from modification times: the cache file is fresh while it is
/// at least as new as the reference artifact.
#[derive(Debug, Clone)]
pub struct FileStaleness {
    cache_file: PathBuf,
    reference: Option<PathBuf>,
}

impl FileStaleness {
    pub fn new(cache_file: impl Into<PathBuf>, reference: Option<PathBuf>) -> Self {
        Self {
            cache_file: cache_file.into(),
            reference,
        }
    }

    fn check(&self) -> Result<bool, StoreError> {
        let Some(cached) = artifact::modified_time(&self.cache_file)? else {
            return Ok(false);
        };
        let source = artifact::reference_time(self.reference.as_deref())?;
        Ok(source <= cached)
    }

    fn touch_cache(&self) -> Result<(), StoreError> {
        let source = artifact::reference_time(self.reference.as_deref())?;
        artifact::touch(&self.cache_file, artifact::now().max(source))?;
        Ok(())
    }

    /// Date the cache file one second before the reference. The reference is
    /// never written; it may be the running executable.
    fn spoil(&self) -> Result<(), StoreError> {
        if !artifact::exists(&self.cache_file) {
            return Ok(());
        }
        let source = artifact::reference_time(self.reference.as_deref())?;
        artifact::touch(&self.cache_file, source - 1)?;
        Ok(())
    }
}

impl StalenessOracle for FileStaleness {
    fn is_fresh(&self) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move { self.check() })
    }

    fn mark_fresh(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move { self.touch_cache() })
    }

    fn mark_stale(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move { self.spoil() })
    }
}

/// Freshness from a row in a tracking table shared by every entity of a
/// store. A timestamp of `0` means "never built" or "forced stale".
#[derive(Debug, Clone)]
pub struct TrackingTableStaleness<C> {
    connection: C,
    tracking_table: String,
    table: String,
    reference: Option<PathBuf>,
}

impl<C: Connection> TrackingTableStaleness<C> {
    pub fn new(
        connection: C,
        tracking_table: impl Into<String>,
        table: impl Into<String>,
        reference: Option<PathBuf>,
    ) -> Self {
        Self {
            connection,
            tracking_table: tracking_table.into(),
            table: table.into(),
            reference,
        }
    }

    /// Create the tracking table, tolerating a concurrent creator.
    async fn ensure_tracking_table(&self) -> Result<(), StoreError> {
        match self
            .connection
            .create_table(&self.tracking_table, &sql::tracking_columns())
            .await
        {
            Err(StoreError::TableExists(_)) | Ok(()) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn check(&self) -> Result<bool, StoreError> {
        if !self.connection.table_exists(&self.tracking_table).await? {
            self.ensure_tracking_table().await?;
            self.connection
                .insert_timestamp(&self.tracking_table, &self.table, 0)
                .await?;
            return Ok(false);
        }

        match self
            .connection
            .read_timestamp(&self.tracking_table, &self.table)
            .await?
        {
            Some(built_at) => {
                let source = artifact::reference_time(self.reference.as_deref())?;
                Ok(built_at > 0 && source <= built_at)
            }
            None => {
                self.connection
                    .insert_timestamp(&self.tracking_table, &self.table, 0)
                    .await?;
                Ok(false)
            }
        }
    }

    async fn record(&self, timestamp: i64) -> Result<(), StoreError> {
        if !self.connection.table_exists(&self.tracking_table).await? {
            self.ensure_tracking_table().await?;
        }
        let updated = self
            .connection
            .update_timestamp(&self.tracking_table, &self.table, timestamp)
            .await?;
        if updated == 0 {
            self.connection
                .insert_timestamp(&self.tracking_table, &self.table, timestamp)
                .await?;
        }
        Ok(())
    }

    async fn spoil(&self) -> Result<(), StoreError> {
        if !self.connection.table_exists(&self.tracking_table).await? {
            return Ok(());
        }
        self.connection
            .update_timestamp(&self.tracking_table, &self.table, 0)
            .await?;
        Ok(())
    }
}

impl<C: Connection> StalenessOracle for TrackingTableStaleness<C> {
    fn is_fresh(&self) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(self.check())
    }

    fn mark_fresh(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let source = artifact::reference_time(self.reference.as_deref())?;
            self.record(artifact::now().max(source)).await
        })
    }

    fn mark_stale(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(self.spoil())
    }
}
