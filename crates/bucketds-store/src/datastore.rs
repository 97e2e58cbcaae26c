//! Bucket datastore
//!
//! Implements the key/value protocol (put/get/has/size/delete/query) on top
//! of a [`RemoteStore`]. Existence and size come from the metadata index,
//! content from the data cache or the remote store. Local state is only
//! updated after the remote store confirms a mutation, so a failed or
//! cancelled call leaves the index and cache untouched.
//!
//! Bulk loading seeds the index from a remote listing. It is meant to run
//! once before the datastore serves traffic; running it alongside live puts
//! and deletes races with them.

use crate::cache::{CacheStats, DataCache};
use crate::index::MetadataIndex;
use crate::query::{Query, QueryResults};
use crate::remote::{CONTENT_TYPE, RemoteStore};
use bucketds_common::{DatastoreConfig, Error, Key, Result, object_path};
use bytes::Bytes;
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Number of lock stripes serializing same-key mutations
const KEY_LOCK_STRIPES: usize = 64;

/// Outcome of a bulk metadata load
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadStats {
    /// Objects recorded in the index
    pub listed: usize,
    /// Objects whose relative path is not a valid key
    pub skipped: usize,
    pub elapsed: Duration,
}

impl LoadStats {
    /// Objects listed per second
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 { 0.0 } else { self.listed as f64 / secs }
    }
}

/// Caching key/value datastore over a remote object store
pub struct BucketDatastore {
    config: DatastoreConfig,
    remote: Arc<dyn RemoteStore>,
    index: MetadataIndex,
    cache: DataCache,
    /// Same-key operations take the same stripe so remote and local
    /// state are updated in one order
    key_locks: Vec<Mutex<()>>,
    /// Upper bound for each remote call
    timeout: Option<Duration>,
}

impl BucketDatastore {
    /// Create a datastore with an empty index and a cache sized from config
    pub fn new(config: DatastoreConfig, remote: Arc<dyn RemoteStore>) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.cache_size)
            .ok_or_else(|| Error::configuration("cache_size must be > 0"))?;
        Ok(Self::assemble(
            config,
            remote,
            MetadataIndex::new(),
            DataCache::new(capacity),
        ))
    }

    /// Create a datastore owning the given index and cache
    pub fn from_parts(
        config: DatastoreConfig,
        remote: Arc<dyn RemoteStore>,
        index: MetadataIndex,
        cache: DataCache,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, remote, index, cache))
    }

    fn assemble(
        config: DatastoreConfig,
        remote: Arc<dyn RemoteStore>,
        index: MetadataIndex,
        cache: DataCache,
    ) -> Self {
        let timeout = config.operation_timeout_ms.map(Duration::from_millis);
        info!(
            "Created datastore: remote: {}, prefix: {:?}, workers: {}, cache size: {}",
            remote.name(),
            config.prefix,
            config.workers,
            cache.capacity()
        );
        Self {
            config,
            remote,
            index,
            cache,
            key_locks: (0..KEY_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            timeout,
        }
    }

    /// Create a datastore and verify the bucket is accessible
    pub async fn open(config: DatastoreConfig, remote: Arc<dyn RemoteStore>) -> Result<Self> {
        let datastore = Self::new(config, remote)?;
        datastore.check_bucket().await?;
        Ok(datastore)
    }

    /// Check that the bucket exists and is accessible
    pub async fn check_bucket(&self) -> Result<()> {
        self.remote_call("bucket check", self.remote.check())
            .await
            .inspect_err(|e| {
                error!(
                    "Failed to access bucket {}. Missing credentials? {}",
                    self.config.bucket, e
                );
            })
    }

    pub fn config(&self) -> &DatastoreConfig {
        &self.config
    }

    /// Data cache statistics
    pub fn cache_stats(&self) -> &CacheStats {
        self.cache.stats()
    }

    /// Number of indexed keys
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Remote object path for a key
    pub fn object_path(&self, key: &Key) -> String {
        object_path(&self.config.prefix, key)
    }

    fn key_lock(&self, key: &Key) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let stripe = (hasher.finish() % self.key_locks.len() as u64) as usize;
        &self.key_locks[stripe]
    }

    async fn lock_key(&self, key: &Key) -> MutexGuard<'_, ()> {
        self.key_lock(key).lock().await
    }

    /// Run a remote call under the configured timeout
    async fn remote_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| Error::Timeout { operation })?,
            None => call.await,
        }
    }

    /// Load metadata for every object under the prefix into the index
    pub async fn load_metadata(&self) -> Result<LoadStats> {
        let start = Instant::now();
        let mut listed = 0;
        let mut skipped = 0;

        let mut listing = self.remote.list(&self.config.prefix);
        loop {
            let entry = self
                .remote_call("list", listing.next())
                .await
                .inspect_err(|e| {
                    error!(
                        "Failed to load metadata for bucket: {} err: {}",
                        self.config.bucket, e
                    );
                })?;
            let Some(entry) = entry else {
                break;
            };

            match Key::new(&entry.key) {
                Ok(key) => {
                    self.index.put(key, entry.size);
                    listed += 1;
                }
                Err(e) => {
                    warn!("Skipping object {:?}: {}", entry.key, e);
                    skipped += 1;
                }
            }
        }

        let stats = LoadStats {
            listed,
            skipped,
            elapsed: start.elapsed(),
        };
        info!(
            "Loaded metadata for {} objects in {:.2} s ({:.2} objects/s)",
            stats.listed,
            stats.elapsed.as_secs_f64(),
            stats.rate()
        );
        Ok(stats)
    }

    /// Write content for a key, replacing any previous value
    pub async fn put(&self, key: &Key, value: Bytes) -> Result<()> {
        let path = self.object_path(key);
        let _guard = self.lock_key(key).await;

        self.remote_call("write", self.remote.write(&path, value.clone(), CONTENT_TYPE))
            .await
            .inspect_err(|e| {
                warn!("Unable to write key: {} size: {} err: {}", key, value.len(), e);
            })?;

        self.index.put(key.clone(), value.len() as u64);
        self.cache.add(key.clone(), value);
        Ok(())
    }

    /// Read content for a key, from the cache when possible
    pub async fn get(&self, key: &Key) -> Result<Bytes> {
        if let Some(value) = self.cache.get(key) {
            debug!("Got value from data cache. key: {} size: {}", key, value.len());
            return Ok(value);
        }

        let _guard = self.lock_key(key).await;
        // A concurrent miss on the same key may have filled the cache
        if let Some(value) = self.cache.peek(key) {
            return Ok(value);
        }

        let path = self.object_path(key);
        let exists = self
            .remote_call("stat", self.remote.stat(&path))
            .await
            .inspect_err(|e| warn!("Problem probing {}: {}", path, e))?;
        if exists.is_none() {
            return Err(Error::not_found(key.as_str()));
        }

        let value = self
            .remote_call("read", self.remote.read(&path))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    Error::not_found(key.as_str())
                } else {
                    warn!("Problem reading {}: {}", path, e);
                    e
                }
            })?;
        self.cache.add(key.clone(), value.clone());
        Ok(value)
    }

    /// Check if a key is indexed; never contacts the remote store
    pub fn has(&self, key: &Key) -> bool {
        self.index.has(key)
    }

    /// Size of an indexed key's content
    pub fn get_size(&self, key: &Key) -> Result<u64> {
        self.index
            .get(key)
            .map(|metadata| metadata.size)
            .ok_or_else(|| Error::not_found(key.as_str()))
    }

    /// Delete a key; deleting an absent key succeeds
    pub async fn delete(&self, key: &Key) -> Result<()> {
        let path = self.object_path(key);
        let _guard = self.lock_key(key).await;

        let removed = self
            .remote_call("delete", self.remote.delete(&path))
            .await
            .or_else(|e| if e.is_not_found() { Ok(false) } else { Err(e) })
            .inspect_err(|e| warn!("Unable to delete key: {} err: {}", key, e))?;
        if !removed {
            debug!("Deleted key {} was already absent remotely", key);
        }

        self.index.delete(key);
        self.cache.remove(key);
        Ok(())
    }

    /// Run a query over a snapshot of the index
    pub fn query(&self, query: Query) -> Result<QueryResults<'_>> {
        query.ensure_supported().inspect_err(|e| warn!("{}", e))?;
        if !query.keys_only {
            warn!(
                "Requested all values for prefix {:?}. This could be expensive.",
                query.prefix
            );
        }
        let metadata = self.index.iter(&query.prefix, query.limit);
        Ok(QueryResults::new(self, metadata, query.keys_only))
    }

    /// Writes are synchronous, so there is nothing to flush
    pub async fn sync(&self, prefix: &str) -> Result<()> {
        debug!("Sync prefix: {}", prefix);
        Ok(())
    }

    /// Release the datastore; the remote client owns its own lifecycle
    pub async fn close(&self) -> Result<()> {
        debug!("Closing datastore for bucket {}", self.config.bucket);
        Ok(())
    }
}

impl std::fmt::Debug for BucketDatastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketDatastore")
            .field("bucket", &self.config.bucket)
            .field("prefix", &self.config.prefix)
            .field("remote", &self.remote.name())
            .field("indexed", &self.index.len())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
