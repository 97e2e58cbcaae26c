//! Configuration types for BucketDS
//!
//! The datastore configuration is deserialized from TOML and validated once,
//! before any remote connection is attempted. Unknown keys, wrong types and
//! out-of-range values are rejected instead of falling back to defaults.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default namespace prefix for objects in the bucket
pub const DEFAULT_PREFIX: &str = "ipfs/";

/// Default number of concurrent workers (informational)
pub const DEFAULT_WORKERS: usize = 100;

/// Default data cache capacity in items
///
/// Content blocks are at most 256 KiB, so this bounds the cache at ~1 GiB.
pub const DEFAULT_CACHE_SIZE: usize = 40_000;

/// Remote backend kind
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Google Cloud Storage, credentials from the environment
    #[default]
    Gcs,
    /// Directory tree rooted at `local_root/bucket`
    Local,
    /// In-process store, contents lost on close
    Memory,
}

/// Datastore configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatastoreConfig {
    /// Bucket (namespace container) name
    pub bucket: String,
    /// Key prefix within the bucket
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Concurrency hint, not enforced by the datastore
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Data cache capacity in items
    #[serde(default = "default_cache_size", alias = "cachesize")]
    pub cache_size: usize,
    /// Remote backend
    #[serde(default)]
    pub backend: BackendKind,
    /// Root directory for the local backend
    #[serde(default)]
    pub local_root: Option<PathBuf>,
    /// Upper bound for each remote call (milliseconds)
    #[serde(default)]
    pub operation_timeout_ms: Option<u64>,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

const fn default_workers() -> usize {
    DEFAULT_WORKERS
}

const fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

impl DatastoreConfig {
    /// Create a config for the given bucket with default settings
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: default_prefix(),
            workers: DEFAULT_WORKERS,
            cache_size: DEFAULT_CACHE_SIZE,
            backend: BackendKind::default(),
            local_root: None,
            operation_timeout_ms: None,
        }
    }

    /// Set the key prefix
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the data cache capacity
    #[must_use]
    pub const fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    /// Set the backend kind
    #[must_use]
    pub const fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the local backend root directory
    #[must_use]
    pub fn with_local_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.local_root = Some(root.into());
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)
            .map_err(|e| Error::configuration(format!("invalid datastore config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Check every field against its accepted range
    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(Error::configuration("no bucket specified"));
        }
        if self.workers == 0 {
            return Err(Error::configuration("workers must be > 0"));
        }
        if self.cache_size == 0 {
            return Err(Error::configuration("cache_size must be > 0"));
        }
        if self.operation_timeout_ms == Some(0) {
            return Err(Error::configuration("operation_timeout_ms must be > 0"));
        }
        if self.backend == BackendKind::Local && self.local_root.is_none() {
            return Err(Error::configuration(
                "local_root is required for the local backend",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DatastoreConfig::from_toml_str(r#"bucket = "blocks""#).unwrap();
        assert_eq!(config.bucket, "blocks");
        assert_eq!(config.prefix, DEFAULT_PREFIX);
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.cache_size, DEFAULT_CACHE_SIZE);
        assert_eq!(config.backend, BackendKind::Gcs);
        assert!(config.operation_timeout_ms.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = DatastoreConfig::from_toml_str(
            r#"
            bucket = "blocks"
            prefix = "node-1/"
            workers = 16
            cachesize = 128
            backend = "local"
            local_root = "/var/lib/bucketds"
            operation_timeout_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.prefix, "node-1/");
        assert_eq!(config.workers, 16);
        assert_eq!(config.cache_size, 128);
        assert_eq!(config.backend, BackendKind::Local);
        assert_eq!(config.local_root, Some(PathBuf::from("/var/lib/bucketds")));
        assert_eq!(config.operation_timeout_ms, Some(5000));
    }

    #[test]
    fn test_missing_bucket() {
        let err = DatastoreConfig::from_toml_str(r#"prefix = "ipfs/""#).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = DatastoreConfig::from_toml_str(r#"bucket = "  ""#).unwrap_err();
        assert!(err.to_string().contains("no bucket specified"));
    }

    #[test]
    fn test_rejects_non_positive_counts() {
        let err = DatastoreConfig::from_toml_str("bucket = \"b\"\nworkers = 0").unwrap_err();
        assert!(err.to_string().contains("workers must be > 0"));

        let err = DatastoreConfig::from_toml_str("bucket = \"b\"\ncache_size = 0").unwrap_err();
        assert!(err.to_string().contains("cache_size must be > 0"));

        let err = DatastoreConfig::from_toml_str("bucket = \"b\"\ncache_size = -5").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_rejects_wrong_types_and_unknown_keys() {
        let err = DatastoreConfig::from_toml_str("bucket = \"b\"\nworkers = \"many\"").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = DatastoreConfig::from_toml_str("bucket = \"b\"\nshards = 4").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_local_backend_requires_root() {
        let config = DatastoreConfig::new("b").with_backend(BackendKind::Local);
        assert!(config.validate().is_err());
        assert!(config.with_local_root("/tmp").validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datastore.toml");
        std::fs::write(&path, "bucket = \"blocks\"\nbackend = \"memory\"\n").unwrap();

        let config = DatastoreConfig::from_file(&path).unwrap();
        assert_eq!(config.backend, BackendKind::Memory);

        let err = DatastoreConfig::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
