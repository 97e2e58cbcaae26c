//! Datastore queries
//!
//! Queries run over a point-in-time snapshot of the metadata index. Only
//! prefix and limit are implemented; requests carrying orders or filters are
//! rejected with [`Error::UnsupportedQuery`].

use crate::datastore::BucketDatastore;
use crate::index::MetadataIter;
use bucketds_common::{Error, Key, Result};
use bytes::Bytes;
use futures::Stream;
use tracing::warn;

/// Result ordering request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Order {
    ByKey,
    ByKeyDescending,
    ByValue,
    ByValueDescending,
}

/// Comparison operator for filters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// Result filtering request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter {
    KeyCompare { op: FilterOp, key: String },
    KeyPrefix(String),
    ValueCompare { op: FilterOp, value: Bytes },
}

/// Query over the datastore's keys
#[derive(Clone, Debug, Default)]
pub struct Query {
    /// Only keys starting with this raw prefix are returned
    pub prefix: String,
    /// Skip value hydration
    pub keys_only: bool,
    /// Upper bound on the number of results; zero means unbounded
    pub limit: usize,
    pub orders: Vec<Order>,
    pub filters: Vec<Filter>,
}

impl Query {
    /// Query every key under a prefix, with values
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Return keys and sizes only
    #[must_use]
    pub const fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Reject capabilities the datastore does not implement
    pub fn ensure_supported(&self) -> Result<()> {
        if !self.orders.is_empty() || !self.filters.is_empty() {
            return Err(Error::unsupported_query("orders and filters are not supported"));
        }
        Ok(())
    }
}

/// One query result
///
/// The size is always populated; the value only when the query was not
/// keys-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub key: Key,
    pub size: u64,
    pub value: Option<Bytes>,
}

/// Cursor over query results
///
/// Produces each snapshot entry once. When value hydration fails the error
/// is returned and the cursor is exhausted from then on.
pub struct QueryResults<'a> {
    datastore: &'a BucketDatastore,
    metadata: MetadataIter,
    keys_only: bool,
    failed: bool,
}

impl<'a> QueryResults<'a> {
    pub(crate) const fn new(
        datastore: &'a BucketDatastore,
        metadata: MetadataIter,
        keys_only: bool,
    ) -> Self {
        Self {
            datastore,
            metadata,
            keys_only,
            failed: false,
        }
    }

    /// Number of snapshot entries not yet produced
    pub fn remaining(&self) -> usize {
        if self.failed { 0 } else { self.metadata.len() }
    }

    /// Produce the next entry, hydrating its value if requested
    pub async fn next(&mut self) -> Option<Result<Entry>> {
        if self.failed {
            return None;
        }
        let metadata = self.metadata.next()?;
        let mut entry = Entry {
            key: metadata.key,
            size: metadata.size,
            value: None,
        };

        if !self.keys_only {
            match self.datastore.get(&entry.key).await {
                Ok(value) => entry.value = Some(value),
                Err(e) => {
                    warn!("Error getting value for {}: {}", entry.key, e);
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        Some(Ok(entry))
    }

    /// Collect every remaining entry, stopping at the first error
    pub async fn rest(mut self) -> Result<Vec<Entry>> {
        let mut entries = Vec::with_capacity(self.remaining());
        while let Some(entry) = self.next().await {
            entries.push(entry?);
        }
        Ok(entries)
    }

    /// Adapt the cursor into a stream
    pub fn into_stream(self) -> impl Stream<Item = Result<Entry>> + 'a {
        futures::stream::unfold(self, |mut results| async move {
            results.next().await.map(|item| (item, results))
        })
    }
}

impl std::fmt::Debug for QueryResults<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResults")
            .field("remaining", &self.remaining())
            .field("keys_only", &self.keys_only)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_query_is_supported() {
        assert!(Query::new("/").ensure_supported().is_ok());
        assert!(Query::new("/blocks").keys_only().with_limit(10).ensure_supported().is_ok());
    }

    #[test]
    fn test_orders_and_filters_rejected() {
        let err = Query::new("/").order_by(Order::ByKey).ensure_supported().unwrap_err();
        assert!(matches!(err, Error::UnsupportedQuery(_)));

        let err = Query::new("/")
            .filter(Filter::KeyCompare {
                op: FilterOp::Gt,
                key: "/a".into(),
            })
            .ensure_supported()
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedQuery(_)));
    }
}
