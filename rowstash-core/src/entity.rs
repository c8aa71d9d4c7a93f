use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::schema::ColumnType;
use crate::value::Record;

/// Where an entity's records come from.
#[derive(Clone)]
pub enum RowSource {
    /// Records fixed by the entity definition. Eligible for a durable cache.
    Static(Arc<Vec<Record>>),
    /// Records computed on every rebuild. Never cached across processes.
    Dynamic(Arc<dyn Fn() -> Vec<Record> + Send + Sync>),
}

impl RowSource {
    pub fn load(&self) -> Vec<Record> {
        match self {
            RowSource::Static(rows) => rows.as_ref().clone(),
            RowSource::Dynamic(provider) => provider(),
        }
    }

    pub fn is_cacheable(&self) -> bool {
        matches!(self, RowSource::Static(_))
    }
}

impl fmt::Debug for RowSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowSource::Static(rows) => f.debug_tuple("Static").field(&rows.len()).finish(),
            RowSource::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

/// How the materialized table of an entity is cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheMode {
    /// In-memory store rebuilt once per process.
    Disabled,
    /// One SQLite file per entity, freshness from file modification times.
    PrivateFile,
    /// One SQLite file named after the given key, shared by every entity using
    /// the same key; freshness from the tracking table.
    Shared(String),
}

/// Registration-time description of a materializable entity.
///
/// Every option has an explicit default; see the builder methods.
///
/// ```ignore
/// let countries = EntityDefinition::new("app::Country", "countries")
///     .rows(vec![
///         Record::new().with("id", 1).with("name", "France"),
///         Record::new().with("id", 2).with("name", "Japan"),
///     ])
///     .batch_size(50);
/// ```
#[derive(Debug, Clone)]
pub struct EntityDefinition {
    identity: String,
    table: String,
    source: RowSource,
    schema: Vec<(String, ColumnType)>,
    primary_key: String,
    incrementing: bool,
    timestamps: bool,
    batch_size: Option<usize>,
    cache: Option<CacheMode>,
    reference: Option<PathBuf>,
}

impl EntityDefinition {
    pub fn new(identity: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            table: table.into(),
            source: RowSource::Static(Arc::new(Vec::new())),
            schema: Vec::new(),
            primary_key: "id".to_string(),
            incrementing: true,
            timestamps: false,
            batch_size: None,
            cache: None,
            reference: None,
        }
    }

    pub fn rows(mut self, rows: Vec<Record>) -> Self {
        self.source = RowSource::Static(Arc::new(rows));
        self
    }

    pub fn dynamic_rows<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Vec<Record> + Send + Sync + 'static,
    {
        self.source = RowSource::Dynamic(Arc::new(provider));
        self
    }

    /// Declare column types. Declared columns are authoritative over inference.
    pub fn schema<I, K, T>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<ColumnType>,
    {
        self.schema = columns
            .into_iter()
            .map(|(name, ty)| (name.into(), ty.into()))
            .collect();
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn incrementing(mut self, incrementing: bool) -> Self {
        self.incrementing = incrementing;
        self
    }

    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn cache(mut self, mode: CacheMode) -> Self {
        self.cache = Some(mode);
        self
    }

    /// Shorthand for `cache(CacheMode::Shared(name))`.
    pub fn shared(self, name: impl Into<String>) -> Self {
        self.cache(CacheMode::Shared(name.into()))
    }

    /// The file whose modification time marks a change of this entity's
    /// definition. Defaults to the running executable.
    pub fn reference(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference = Some(path.into());
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn source(&self) -> &RowSource {
        &self.source
    }

    pub fn declared_schema(&self) -> &[(String, ColumnType)] {
        &self.schema
    }

    pub fn primary_key_name(&self) -> &str {
        &self.primary_key
    }

    pub fn is_incrementing(&self) -> bool {
        self.incrementing
    }

    pub fn uses_timestamps(&self) -> bool {
        self.timestamps
    }

    /// Batch size for inserts, falling back to `default` when not set. Never 0.
    pub fn insert_batch_size(&self, default: usize) -> usize {
        self.batch_size.unwrap_or(default).max(1)
    }

    /// The cache mode in effect: the explicit one, otherwise a private file
    /// for static rows and no cache for dynamic rows.
    pub fn cache_mode(&self) -> CacheMode {
        match &self.cache {
            Some(mode) => mode.clone(),
            None if self.source.is_cacheable() => CacheMode::PrivateFile,
            None => CacheMode::Disabled,
        }
    }

    pub fn reference_path(&self) -> Option<PathBuf> {
        self.reference
            .clone()
            .or_else(|| std::env::current_exe().ok())
    }

    /// Name under which the bound connection is known: the shared key in
    /// shared mode, the identity otherwise.
    pub fn connection_name(&self) -> &str {
        match &self.cache {
            Some(CacheMode::Shared(name)) => name,
            _ => &self.identity,
        }
    }

    /// Private cache file name: `<prefix>-<kebab identity>.sqlite`.
    pub fn private_file_name(&self, prefix: &str) -> String {
        format!("{prefix}-{}.sqlite", kebab_identity(&self.identity))
    }
}

/// A Rust type that owns a materializable table.
///
/// The type's fully qualified name is its identity.
///
/// ```ignore
/// struct Country;
///
/// impl Materialize for Country {
///     fn table_name() -> &'static str { "countries" }
///     fn rows() -> Vec<Record> {
///         vec![Record::new().with("id", 1).with("name", "France")]
///     }
/// }
/// ```
pub trait Materialize: Send + Sync + 'static {
    fn table_name() -> &'static str;

    fn rows() -> Vec<Record>;

    /// Adjust the generated definition (schema, cache mode, batch size...).
    fn configure(definition: EntityDefinition) -> EntityDefinition {
        definition
    }

    fn definition() -> EntityDefinition {
        let definition = EntityDefinition::new(std::any::type_name::<Self>(), Self::table_name())
            .rows(Self::rows());
        Self::configure(definition)
    }
}

/// `my_app::models::CountryCode` -> `my-app-models-country-code`.
pub(crate) fn kebab_identity(identity: &str) -> String {
    let mut out = String::with_capacity(identity.len() + 8);
    let mut prev_lower = false;
    for c in identity.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                push_separator(&mut out);
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
            prev_lower = true;
        } else {
            push_separator(&mut out);
            prev_lower = false;
        }
    }
    out.trim_matches('-').to_string()
}

fn push_separator(out: &mut String) {
    if !out.is_empty() && !out.ends_with('-') {
        out.push('-');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kebab_identity() {
        assert_eq!(kebab_identity("my_app::models::CountryCode"), "my-app-models-country-code");
        assert_eq!(kebab_identity("Country"), "country");
        assert_eq!(kebab_identity("tests::HTTPStatus"), "tests-httpstatus");
        assert_eq!(kebab_identity("a::b<c::D>"), "a-b-c-d");
    }

    #[test]
    fn test_default_cache_mode_follows_source() {
        let static_rows = EntityDefinition::new("a::B", "bs").rows(vec![Record::new()]);
        assert_eq!(static_rows.cache_mode(), CacheMode::PrivateFile);

        let dynamic = EntityDefinition::new("a::B", "bs").dynamic_rows(Vec::new);
        assert_eq!(dynamic.cache_mode(), CacheMode::Disabled);

        let shared = EntityDefinition::new("a::B", "bs").shared("catalog");
        assert_eq!(shared.cache_mode(), CacheMode::Shared("catalog".into()));
        assert_eq!(shared.connection_name(), "catalog");
    }

    #[test]
    fn test_batch_size_defaults_and_floor() {
        let def = EntityDefinition::new("a::B", "bs");
        assert_eq!(def.insert_batch_size(100), 100);
        assert_eq!(def.clone().batch_size(0).insert_batch_size(100), 1);
        assert_eq!(def.batch_size(2).insert_batch_size(100), 2);
    }

    #[test]
    fn test_private_file_name() {
        let def = EntityDefinition::new("shop::Product", "products");
        assert_eq!(def.private_file_name("rowstash"), "rowstash-shop-product.sqlite");
    }

    struct Planet;

    impl Materialize for Planet {
        fn table_name() -> &'static str {
            "planets"
        }

        fn rows() -> Vec<Record> {
            vec![Record::new().with("id", 1).with("name", "Mercury")]
        }

        fn configure(definition: EntityDefinition) -> EntityDefinition {
            definition.batch_size(10)
        }
    }

    #[test]
    fn test_materialize_definition() {
        let def = Planet::definition();
        assert!(def.identity().ends_with("::Planet"));
        assert_eq!(def.table_name(), "planets");
        assert_eq!(def.source().load().len(), 1);
        assert_eq!(def.insert_batch_size(100), 10);
    }
}
