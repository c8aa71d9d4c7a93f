mod loader;
pub mod value;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use value::{ConfigValue, FromConfigValue};

pub const DEFAULT_CACHE_PATH: &str = "storage/cache";
pub const DEFAULT_CACHE_PREFIX: &str = "rowstash";
pub const DEFAULT_TRACKING_TABLE: &str = "rowstash_cache_records";
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_POOL_SIZE: u32 = 4;

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// The requested key was not found in the configuration.
    NotFound(String),
    /// The value could not be converted to the requested type.
    TypeMismatch { key: String, expected: &'static str },
    /// An I/O or YAML parsing error occurred while loading a config file.
    Load(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "Config key not found: {key}"),
            ConfigError::TypeMismatch { key, expected } => {
                write!(f, "Config type mismatch for '{key}': expected {expected}")
            }
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Raw key-value configuration loaded from YAML, `.env` files and the
/// process environment.
///
/// Resolution order (lowest to highest priority):
/// 1. the YAML file passed to [`RowstashConfig::load`]
/// 2. `.env` file (loaded into the process environment, never overwriting)
/// 3. environment variables (`ROWSTASH_CACHE_PATH` overrides `rowstash.cache.path`)
#[derive(Debug, Clone, Default)]
pub struct RowstashConfig {
    values: HashMap<String, ConfigValue>,
}

impl RowstashConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        loader::load_yaml_file(path.as_ref(), &mut values)?;

        let _ = dotenvy::dotenv();

        // Convention: `rowstash.cache.path` <-> `ROWSTASH_CACHE_PATH`
        for (env_key, env_val) in std::env::vars() {
            if env_key.starts_with("ROWSTASH_") {
                let config_key = env_key.to_lowercase().replace('_', ".");
                values.insert(config_key, ConfigValue::String(env_val));
            }
        }

        Ok(Self { values })
    }

    /// Create a config from a YAML string (useful for testing).
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        loader::load_yaml_str(yaml, &mut values)?;
        Ok(Self { values })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: ConfigValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    /// Typed value, or `default` when the key is missing. A present value of
    /// the wrong type is still an error.
    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> Result<V, ConfigError> {
        match self.get(key) {
            Err(ConfigError::NotFound(_)) => Ok(default),
            other => other,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

/// Settings consumed by the cache gate.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Directory holding private and shared cache files.
    pub cache_path: PathBuf,
    /// Prefix of private cache file names.
    pub cache_prefix: String,
    /// Name of the tracking table used by shared and transient stores.
    pub tracking_table: String,
    /// Insert batch size for entities that do not set their own.
    pub batch_size: usize,
    /// Maximum pooled connections per cache file.
    pub pool_size: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            tracking_table: DEFAULT_TRACKING_TABLE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl CacheConfig {
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
            ..Self::default()
        }
    }

    pub fn from_config(config: &RowstashConfig) -> Result<Self, ConfigError> {
        let cache_path: String = config.get_or("rowstash.cache.path", DEFAULT_CACHE_PATH.into())?;
        Ok(Self {
            cache_path: PathBuf::from(cache_path),
            cache_prefix: config.get_or("rowstash.cache.prefix", DEFAULT_CACHE_PREFIX.into())?,
            tracking_table: config
                .get_or("rowstash.cache.table", DEFAULT_TRACKING_TABLE.into())?,
            batch_size: config.get_or("rowstash.batch.size", DEFAULT_BATCH_SIZE)?,
            pool_size: config.get_or("rowstash.pool.size", DEFAULT_POOL_SIZE)?,
        })
    }

    /// Load from a YAML file plus environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_config(&RowstashConfig::load(path)?)
    }

    pub fn private_file(&self, file_name: &str) -> PathBuf {
        self.cache_path.join(file_name)
    }

    pub fn shared_file(&self, name: &str) -> PathBuf {
        self.cache_path.join(format!("{name}.sqlite"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let config = CacheConfig::from_config(&RowstashConfig::empty()).unwrap();
        assert_eq!(config, CacheConfig::default());
        assert_eq!(config.batch_size, 100);
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
rowstash:
  cache:
    path: /var/cache/app
    prefix: fixtures
  batch:
    size: 25
"#;
        let raw = RowstashConfig::from_yaml_str(yaml).unwrap();
        let config = CacheConfig::from_config(&raw).unwrap();
        assert_eq!(config.cache_path, PathBuf::from("/var/cache/app"));
        assert_eq!(config.cache_prefix, "fixtures");
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.tracking_table, DEFAULT_TRACKING_TABLE);
    }

    #[test]
    fn test_wrong_type_is_reported() {
        let mut raw = RowstashConfig::empty();
        raw.set("rowstash.batch.size", ConfigValue::String("lots".into()));
        let err = CacheConfig::from_config(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));
    }

    #[test]
    fn test_string_numbers_from_env_style_values() {
        let mut raw = RowstashConfig::empty();
        raw.set("rowstash.pool.size", ConfigValue::String("2".into()));
        let config = CacheConfig::from_config(&raw).unwrap();
        assert_eq!(config.pool_size, 2);
    }

    #[test]
    fn test_shared_file_path() {
        let config = CacheConfig::new("/tmp/cache");
        assert_eq!(
            config.shared_file("catalog"),
            PathBuf::from("/tmp/cache/catalog.sqlite")
        );
    }
}
