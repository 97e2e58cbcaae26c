//! Remote object store collaborator
//!
//! The datastore talks to durable storage only through [`RemoteStore`].
//! Objects are addressed by full path (namespace prefix + key); the listing
//! strips the prefix and yields relative keys with their sizes.

use async_trait::async_trait;
use bucketds_common::{BackendKind, DatastoreConfig, Error, Result};
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info};

/// Content type tag attached to every written object
pub const CONTENT_TYPE: &str = "text/plain";

/// One object discovered by a listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Object path with the namespace prefix stripped
    pub key: String,
    /// Object size in bytes
    pub size: u64,
}

/// Cursor over a prefix-scoped listing
///
/// `next` yields `Ok(Some(entry))` per object, `Ok(None)` once the listing
/// is exhausted, and surfaces listing errors per call.
pub struct ObjectListing<'a> {
    stream: BoxStream<'a, Result<ObjectEntry>>,
}

impl<'a> ObjectListing<'a> {
    pub fn new(stream: BoxStream<'a, Result<ObjectEntry>>) -> Self {
        Self { stream }
    }

    /// Listing over a fixed set of results
    pub fn from_results(results: Vec<Result<ObjectEntry>>) -> Self {
        Self::new(stream::iter(results).boxed())
    }

    /// Fetch the next entry, or `None` at the end of the listing
    pub async fn next(&mut self) -> Result<Option<ObjectEntry>> {
        self.stream.next().await.transpose()
    }
}

/// Trait for the durable store backing a datastore namespace
///
/// Implementations must be safe for concurrent use by every datastore
/// operation without external locking.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Verify that the bucket is reachable with the current credentials
    async fn check(&self) -> Result<()>;

    /// Probe an object, returning its size if it exists
    async fn stat(&self, path: &str) -> Result<Option<u64>>;

    /// Read a whole object; a missing object is `Error::NotFound`
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Write a whole object, replacing any previous content
    async fn write(&self, path: &str, data: Bytes, content_type: &str) -> Result<()>;

    /// Delete an object, returning `false` if it did not exist
    async fn delete(&self, path: &str) -> Result<bool>;

    /// List every object under `prefix`
    fn list<'a>(&'a self, prefix: &str) -> ObjectListing<'a>;
}

/// [`RemoteStore`] backed by an `object_store` implementation
#[derive(Debug)]
pub struct ObjectStoreRemote {
    name: String,
    store: Arc<dyn ObjectStore>,
    /// Whether the backend accepts content-type attributes on write
    content_types: bool,
}

impl ObjectStoreRemote {
    /// Wrap an existing object store
    pub fn new(name: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            name: name.into(),
            store,
            content_types: true,
        }
    }

    /// In-process store
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new("memory", Arc::new(InMemory::new()))
    }

    /// Build the backend selected by the configuration
    ///
    /// Only the backend fields are consulted; the rest of the configuration
    /// is validated when the datastore is created.
    pub fn from_config(config: &DatastoreConfig) -> Result<Self> {
        match config.backend {
            BackendKind::Gcs => {
                let store = GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(&config.bucket)
                    .build()
                    .map_err(|e| {
                        Error::configuration(format!("failed to create GCS client: {e}"))
                    })?;
                info!("Using GCS bucket {}", config.bucket);
                Ok(Self::new(format!("gcs://{}", config.bucket), Arc::new(store)))
            }
            BackendKind::Local => {
                let root = config
                    .local_root
                    .as_ref()
                    .ok_or_else(|| Error::configuration("local_root is required"))?
                    .join(&config.bucket);
                std::fs::create_dir_all(&root).map_err(|e| {
                    Error::configuration(format!("failed to create {}: {e}", root.display()))
                })?;
                let store = LocalFileSystem::new_with_prefix(&root).map_err(|e| {
                    Error::configuration(format!("failed to open {}: {e}", root.display()))
                })?;
                info!("Using local directory {}", root.display());
                Ok(Self {
                    name: format!("file://{}", root.display()),
                    store: Arc::new(store),
                    // the filesystem has nowhere to keep attributes
                    content_types: false,
                })
            }
            BackendKind::Memory => Ok(Self::in_memory()),
        }
    }
}

fn map_err(path: &str, err: object_store::Error) -> Error {
    match err {
        object_store::Error::NotFound { .. } => Error::not_found(path),
        other => Error::transport(other),
    }
}

/// Strip the encoded prefix from a listed location and percent-decode the
/// remainder back into the name it was written under
fn relative_key(location: &str, prefix: &str) -> String {
    let relative = if prefix.is_empty() {
        location
    } else {
        location
            .strip_prefix(prefix)
            .map_or(location, |rest| rest.trim_start_matches('/'))
    };
    urlencoding::decode(relative).map_or_else(|_| relative.to_string(), Cow::into_owned)
}

#[async_trait]
impl RemoteStore for ObjectStoreRemote {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<()> {
        self.store
            .list_with_delimiter(None)
            .await
            .map(|_| ())
            .map_err(|e| map_err("/", e))
    }

    async fn stat(&self, path: &str) -> Result<Option<u64>> {
        match self.store.head(&Path::from(path)).await {
            Ok(meta) => Ok(Some(meta.size as u64)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(Error::transport(e)),
        }
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let result = self
            .store
            .get(&Path::from(path))
            .await
            .map_err(|e| map_err(path, e))?;
        result.bytes().await.map_err(|e| map_err(path, e))
    }

    async fn write(&self, path: &str, data: Bytes, content_type: &str) -> Result<()> {
        let mut opts = PutOptions::default();
        if self.content_types {
            let mut attributes = Attributes::new();
            attributes.insert(
                Attribute::ContentType,
                AttributeValue::from(content_type.to_string()),
            );
            opts.attributes = attributes;
        }
        self.store
            .put_opts(&Path::from(path), PutPayload::from(data), opts)
            .await
            .map(|_| ())
            .map_err(Error::transport)
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        match self.store.delete(&Path::from(path)).await {
            Ok(()) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => {
                debug!("Delete of missing object {}", path);
                Ok(false)
            }
            Err(e) => Err(Error::transport(e)),
        }
    }

    fn list<'a>(&'a self, prefix: &str) -> ObjectListing<'a> {
        let location = Path::from(prefix);
        let encoded = location.as_ref().to_string();
        let stream = self
            .store
            .list((!encoded.is_empty()).then_some(&location))
            .map_err(Error::transport)
            .map_ok(move |meta| ObjectEntry {
                key: relative_key(meta.location.as_ref(), &encoded),
                size: meta.size as u64,
            })
            .boxed();
        ObjectListing::new(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_key() {
        assert_eq!(relative_key("ipfs/ABC", "ipfs"), "ABC");
        assert_eq!(relative_key("ipfs/blocks/ABC", "ipfs"), "blocks/ABC");
        assert_eq!(relative_key("ABC", ""), "ABC");
        assert_eq!(relative_key("ipfs/a%23b", "ipfs"), "a#b");
        assert_eq!(relative_key("ipfs/100%25", "ipfs"), "100%");
    }

    #[tokio::test]
    async fn test_list_decodes_escaped_names() {
        let remote = ObjectStoreRemote::in_memory();
        for path in ["ipfs/a#b", "ipfs/x~[1]|{2}", "ipfs/50%"] {
            remote
                .write(path, Bytes::from_static(b"v"), CONTENT_TYPE)
                .await
                .unwrap();
        }

        let mut listing = remote.list("ipfs/");
        let mut keys = Vec::new();
        while let Some(entry) = listing.next().await.unwrap() {
            keys.push(entry.key);
        }
        keys.sort();
        assert_eq!(keys, vec!["50%", "a#b", "x~[1]|{2}"]);
    }

    #[tokio::test]
    async fn test_write_read_stat_delete() {
        let remote = ObjectStoreRemote::in_memory();
        assert_eq!(remote.stat("ipfs/A").await.unwrap(), None);

        remote
            .write("ipfs/A", Bytes::from_static(b"hello"), CONTENT_TYPE)
            .await
            .unwrap();
        assert_eq!(remote.stat("ipfs/A").await.unwrap(), Some(5));
        assert_eq!(remote.read("ipfs/A").await.unwrap(), Bytes::from_static(b"hello"));

        remote.delete("ipfs/A").await.unwrap();
        assert_eq!(remote.stat("ipfs/A").await.unwrap(), None);
        assert!(remote.read("ipfs/A").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_is_prefix_scoped() {
        let remote = ObjectStoreRemote::in_memory();
        for (path, data) in [
            ("ipfs/A", &b"1"[..]),
            ("ipfs/blocks/B", &b"22"[..]),
            ("other/C", &b"333"[..]),
        ] {
            remote
                .write(path, Bytes::copy_from_slice(data), CONTENT_TYPE)
                .await
                .unwrap();
        }

        let mut listing = remote.list("ipfs/");
        let mut entries = Vec::new();
        while let Some(entry) = listing.next().await.unwrap() {
            entries.push(entry);
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        assert_eq!(
            entries,
            vec![
                ObjectEntry { key: "A".into(), size: 1 },
                ObjectEntry { key: "blocks/B".into(), size: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatastoreConfig::new("blocks")
            .with_backend(BackendKind::Local)
            .with_local_root(dir.path());
        let remote = ObjectStoreRemote::from_config(&config).unwrap();
        remote.check().await.unwrap();

        remote
            .write("ipfs/A", Bytes::from_static(b"abc"), CONTENT_TYPE)
            .await
            .unwrap();
        assert!(dir.path().join("blocks/ipfs/A").exists());
        assert_eq!(remote.read("ipfs/A").await.unwrap(), Bytes::from_static(b"abc"));

        assert!(remote.delete("ipfs/A").await.unwrap());
        assert!(!remote.delete("ipfs/A").await.unwrap());
    }

    #[tokio::test]
    async fn test_listing_from_results() {
        let mut listing = ObjectListing::from_results(vec![
            Ok(ObjectEntry { key: "A".into(), size: 1 }),
            Err(Error::transport("listing interrupted")),
        ]);
        assert!(listing.next().await.unwrap().is_some());
        assert!(listing.next().await.is_err());
        assert!(listing.next().await.unwrap().is_none());
    }
}
