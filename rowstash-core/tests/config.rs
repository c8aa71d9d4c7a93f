use std::path::PathBuf;

use rowstash_core::{CacheConfig, RowstashConfig};
use serial_test::serial;

const YAML: &str = r#"
rowstash:
  cache:
    path: /srv/cache
    table: fixtures_tracking
  batch:
    size: 50
"#;

#[test]
#[serial]
fn test_yaml_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rowstash.yaml");
    std::fs::write(&path, YAML).unwrap();

    let config = CacheConfig::load(&path).unwrap();
    assert_eq!(config.cache_path, PathBuf::from("/srv/cache"));
    assert_eq!(config.tracking_table, "fixtures_tracking");
    assert_eq!(config.batch_size, 50);
    assert_eq!(config.cache_prefix, "rowstash");
}

#[test]
#[serial]
fn test_env_overrides_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rowstash.yaml");
    std::fs::write(&path, YAML).unwrap();

    std::env::set_var("ROWSTASH_BATCH_SIZE", "7");
    let config = CacheConfig::load(&path);
    std::env::remove_var("ROWSTASH_BATCH_SIZE");

    let config = config.unwrap();
    assert_eq!(config.batch_size, 7);
    assert_eq!(config.cache_path, PathBuf::from("/srv/cache"));
}

#[test]
#[serial]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let raw = RowstashConfig::load(dir.path().join("absent.yaml")).unwrap();
    assert!(!raw.contains_key("rowstash.cache.path"));
    assert_eq!(CacheConfig::from_config(&raw).unwrap(), CacheConfig::default());
}
