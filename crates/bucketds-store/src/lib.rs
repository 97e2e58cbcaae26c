//! BucketDS Store - Caching datastore over a remote object store
//!
//! This crate makes a high-latency object store behave like a low-latency
//! key/value store:
//! - Metadata index answering existence and size queries without remote calls
//! - Bounded LRU data cache avoiding redundant remote reads
//! - Snapshot query iterator over the index
//! - The datastore adapter keeping both in lockstep with remote mutations

pub mod cache;
pub mod datastore;
pub mod index;
pub mod query;
pub mod remote;

// Re-exports
pub use cache::{CacheStats, DataCache};
pub use datastore::{BucketDatastore, LoadStats};
pub use index::{MetadataIndex, MetadataIter};
pub use query::{Entry, Filter, FilterOp, Order, Query, QueryResults};
pub use remote::{CONTENT_TYPE, ObjectEntry, ObjectListing, ObjectStoreRemote, RemoteStore};
