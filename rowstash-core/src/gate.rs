//! Entry point run before every read of a materialized table.
//!
//! The gate binds each entity to a store the first time it is seen, keeps the
//! binding for its own lifetime, and rebuilds the entity's table whenever the
//! binding's staleness oracle says so.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::artifact;
use crate::config::CacheConfig;
use crate::connection::{Connection, StoreOpener, StoreTarget};
use crate::engine::{self, RebuildReport};
use crate::entity::{CacheMode, EntityDefinition};
use crate::error::{MaterializeError, Operation, StoreResultExt};
use crate::staleness::{FileStaleness, StalenessOracle, TrackingTableStaleness};
use crate::value::Record;

/// Which store an entity is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingMode {
    /// In-memory store for this process only.
    Transient,
    PrivateFile(PathBuf),
    Shared { name: String, path: PathBuf },
}

impl BindingMode {
    pub fn path(&self) -> Option<&Path> {
        match self {
            BindingMode::Transient => None,
            BindingMode::PrivateFile(path) | BindingMode::Shared { path, .. } => Some(path),
        }
    }
}

/// The association between one entity and its store.
pub struct ConnectionBinding<C> {
    identity: String,
    connection_name: String,
    mode: BindingMode,
    connection: C,
    oracle: Box<dyn StalenessOracle>,
    /// Set when the binding created a placeholder file that still has to be
    /// filled.
    pending_build: AtomicBool,
    rebuild_lock: Mutex<()>,
}

impl<C> ConnectionBinding<C> {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    pub fn mode(&self) -> &BindingMode {
        &self.mode
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn is_transient(&self) -> bool {
        self.mode == BindingMode::Transient
    }
}

impl<C> std::fmt::Debug for ConnectionBinding<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionBinding")
            .field("identity", &self.identity)
            .field("connection_name", &self.connection_name)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Result of [`CacheGate::ensure_fresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialization {
    /// The table already reflected the source.
    Fresh,
    Rebuilt(RebuildReport),
}

impl Materialization {
    pub fn was_rebuilt(&self) -> bool {
        matches!(self, Materialization::Rebuilt(_))
    }
}

/// Guarantees that an entity's table is materialized and fresh before it is
/// read.
///
/// ```ignore
/// let gate = CacheGate::new(SqliteOpener::default(), CacheConfig::new("storage/cache"));
/// gate.ensure_fresh(&Country::definition()).await?;
/// let pool = gate.connection(&Country::definition()).await?;
/// ```
pub struct CacheGate<O: StoreOpener> {
    opener: O,
    config: CacheConfig,
    bindings: DashMap<String, Arc<ConnectionBinding<O::Connection>>>,
    shared: DashMap<PathBuf, O::Connection>,
}

impl<O: StoreOpener> CacheGate<O> {
    pub fn new(opener: O, config: CacheConfig) -> Self {
        Self {
            opener,
            config,
            bindings: DashMap::new(),
            shared: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn opener(&self) -> &O {
        &self.opener
    }

    /// Rebuild the entity's table if it is stale. The only place deciding
    /// whether a rebuild happens.
    pub async fn ensure_fresh(
        &self,
        entity: &EntityDefinition,
    ) -> Result<Materialization, MaterializeError> {
        let binding = self.bind(entity).await?;
        let identity = entity.identity();

        if !binding.pending_build.load(Ordering::SeqCst)
            && binding.oracle.is_fresh().await.during(identity, Operation::Track)?
        {
            tracing::debug!(entity = identity, "Materialized table is fresh");
            return Ok(Materialization::Fresh);
        }

        let _guard = binding.rebuild_lock.lock().await;
        let pending = binding.pending_build.swap(false, Ordering::SeqCst);
        if !pending && binding.oracle.is_fresh().await.during(identity, Operation::Track)? {
            return Ok(Materialization::Fresh);
        }

        match engine::rebuild(
            &binding.connection,
            entity,
            binding.oracle.as_ref(),
            self.config.batch_size,
        )
        .await
        {
            Ok(report) => Ok(Materialization::Rebuilt(report)),
            Err(e) => {
                binding.pending_build.store(pending, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Force the next [`ensure_fresh`](Self::ensure_fresh) to rebuild. Never
    /// rebuilds by itself.
    pub async fn invalidate(&self, entity: &EntityDefinition) -> Result<(), MaterializeError> {
        let binding = self.bind(entity).await?;
        binding
            .oracle
            .mark_stale()
            .await
            .during(entity.identity(), Operation::Track)?;
        tracing::info!(entity = entity.identity(), "Materialized table invalidated");
        Ok(())
    }

    /// Invalidate, then rebuild immediately.
    pub async fn refresh(
        &self,
        entity: &EntityDefinition,
    ) -> Result<Materialization, MaterializeError> {
        self.invalidate(entity).await?;
        self.ensure_fresh(entity).await
    }

    /// The connection holding the entity's fresh table.
    pub async fn connection(
        &self,
        entity: &EntityDefinition,
    ) -> Result<O::Connection, MaterializeError> {
        self.ensure_fresh(entity).await?;
        let binding = self.bind(entity).await?;
        Ok(binding.connection.clone())
    }

    /// Every row of the entity's fresh table, in insertion order.
    pub async fn rows(&self, entity: &EntityDefinition) -> Result<Vec<Record>, MaterializeError> {
        let connection = self.connection(entity).await?;
        connection
            .fetch_all(entity.table_name())
            .await
            .during(entity.identity(), Operation::Read)
    }

    /// The binding of an entity, if it has been bound already.
    pub fn binding(
        &self,
        entity: &EntityDefinition,
    ) -> Option<Arc<ConnectionBinding<O::Connection>>> {
        self.bindings
            .get(entity.identity())
            .map(|entry| entry.value().clone())
    }

    /// Get or create the binding of `entity`.
    async fn bind(
        &self,
        entity: &EntityDefinition,
    ) -> Result<Arc<ConnectionBinding<O::Connection>>, MaterializeError> {
        if let Some(binding) = self.binding(entity) {
            return Ok(binding);
        }

        let binding = Arc::new(self.create_binding(entity).await?);
        tracing::debug!(
            entity = entity.identity(),
            mode = ?binding.mode,
            "Entity bound to store"
        );
        Ok(self
            .bindings
            .entry(entity.identity().to_string())
            .or_insert(binding)
            .value()
            .clone())
    }

    async fn create_binding(
        &self,
        entity: &EntityDefinition,
    ) -> Result<ConnectionBinding<O::Connection>, MaterializeError> {
        match entity.cache_mode() {
            CacheMode::Disabled => self.transient_binding(entity).await,
            CacheMode::PrivateFile => self.private_binding(entity).await,
            CacheMode::Shared(name) => self.shared_binding(entity, name).await,
        }
    }

    async fn transient_binding(
        &self,
        entity: &EntityDefinition,
    ) -> Result<ConnectionBinding<O::Connection>, MaterializeError> {
        let connection = self.open(entity, &StoreTarget::Memory).await?;
        let oracle = TrackingTableStaleness::new(
            connection.clone(),
            &self.config.tracking_table,
            entity.table_name(),
            entity.reference_path(),
        );
        Ok(ConnectionBinding {
            identity: entity.identity().to_string(),
            connection_name: entity.connection_name().to_string(),
            mode: BindingMode::Transient,
            connection,
            oracle: Box::new(oracle),
            pending_build: AtomicBool::new(false),
            rebuild_lock: Mutex::new(()),
        })
    }

    async fn private_binding(
        &self,
        entity: &EntityDefinition,
    ) -> Result<ConnectionBinding<O::Connection>, MaterializeError> {
        let file_name = entity.private_file_name(&self.config.cache_prefix);
        let path = self.config.private_file(&file_name);
        let reference = entity.reference_path();

        let mut pending_build = false;
        if !artifact::exists(&path) {
            if !artifact::is_writable_dir(&self.config.cache_path) {
                self.warn_fallback(entity, "cache directory is missing or not writable");
                return self.transient_binding(entity).await;
            }
            match create_placeholder(&path, reference.as_deref()) {
                Ok(()) => pending_build = true,
                // Another process created it between our check and now.
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    self.warn_fallback(entity, &e.to_string());
                    return self.transient_binding(entity).await;
                }
            }
        }

        let connection = match self.open(entity, &StoreTarget::File(path.clone())).await {
            Ok(connection) => connection,
            Err(e) if pending_build => {
                let _ = std::fs::remove_file(&path);
                self.warn_fallback(entity, &e.to_string());
                return self.transient_binding(entity).await;
            }
            Err(e) => return Err(e),
        };
        Ok(ConnectionBinding {
            identity: entity.identity().to_string(),
            connection_name: entity.connection_name().to_string(),
            mode: BindingMode::PrivateFile(path.clone()),
            connection,
            oracle: Box::new(FileStaleness::new(path, reference)),
            pending_build: AtomicBool::new(pending_build),
            rebuild_lock: Mutex::new(()),
        })
    }

    async fn shared_binding(
        &self,
        entity: &EntityDefinition,
        name: String,
    ) -> Result<ConnectionBinding<O::Connection>, MaterializeError> {
        let path = self.config.shared_file(&name);
        let existed = artifact::exists(&path);
        if !existed && !artifact::is_writable_dir(&self.config.cache_path) {
            self.warn_fallback(entity, "cache directory is missing or not writable");
            return self.transient_binding(entity).await;
        }

        let connection = match self.shared_connection(entity, &path).await {
            Ok(connection) => connection,
            // A file this process could not create is a configuration fault.
            Err(e) if !existed => {
                self.warn_fallback(entity, &e.to_string());
                return self.transient_binding(entity).await;
            }
            Err(e) => return Err(e),
        };
        let oracle = TrackingTableStaleness::new(
            connection.clone(),
            &self.config.tracking_table,
            entity.table_name(),
            entity.reference_path(),
        );
        Ok(ConnectionBinding {
            identity: entity.identity().to_string(),
            connection_name: name.clone(),
            mode: BindingMode::Shared { name, path },
            connection,
            oracle: Box::new(oracle),
            pending_build: AtomicBool::new(false),
            rebuild_lock: Mutex::new(()),
        })
    }

    /// One connection per shared file, reused by every entity bound to it.
    async fn shared_connection(
        &self,
        entity: &EntityDefinition,
        path: &Path,
    ) -> Result<O::Connection, MaterializeError> {
        if let Some(connection) = self.shared.get(path) {
            return Ok(connection.value().clone());
        }
        let connection = self
            .open(entity, &StoreTarget::File(path.to_path_buf()))
            .await?;
        Ok(self
            .shared
            .entry(path.to_path_buf())
            .or_insert(connection)
            .value()
            .clone())
    }

    async fn open(
        &self,
        entity: &EntityDefinition,
        target: &StoreTarget,
    ) -> Result<O::Connection, MaterializeError> {
        self.opener
            .open(target)
            .await
            .during(entity.identity(), Operation::Open)
    }

    fn warn_fallback(&self, entity: &EntityDefinition, reason: &str) {
        tracing::warn!(
            entity = entity.identity(),
            cache_path = %self.config.cache_path.display(),
            reason,
            "Falling back to a transient in-memory store"
        );
    }
}

/// Empty cache file dated one second before the reference artifact, so the
/// first freshness check sees it as stale.
fn create_placeholder(path: &Path, reference: Option<&Path>) -> io::Result<()> {
    let reference_time = artifact::reference_time(reference)?;
    artifact::create_empty(path, reference_time - 1)
}
