//! Core type definitions for BucketDS
//!
//! Datastore keys and the per-object metadata record kept by the index.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum key length in bytes (UTF-8)
pub const MAX_KEY_LEN: usize = 1024;

/// Datastore key: a cleaned, slash-separated path that always starts with `/`
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(try_from = "String", into = "String")]
pub struct Key(String);

impl Key {
    /// Create a key, cleaning redundant separators
    ///
    /// `"a//b/"` becomes `"/a/b"`. The root key, `.`/`..` segments and
    /// control characters are rejected.
    pub fn new(key: impl AsRef<str>) -> Result<Self, KeyError> {
        let raw = key.as_ref();
        let mut cleaned = String::with_capacity(raw.len() + 1);
        for segment in raw.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." {
                return Err(KeyError::RelativeSegment(segment.to_string()));
            }
            if let Some(c) = segment.chars().find(|c| c.is_control()) {
                return Err(KeyError::InvalidChar(c));
            }
            cleaned.push('/');
            cleaned.push_str(segment);
        }

        if cleaned.is_empty() {
            return Err(KeyError::Empty);
        }
        if cleaned.len() > MAX_KEY_LEN {
            return Err(KeyError::TooLong);
        }
        Ok(Self(cleaned))
    }

    /// Get the key as a string slice (always starts with `/`)
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key without its leading separator
    #[must_use]
    pub fn relative(&self) -> &str {
        &self.0[1..]
    }

    /// Check whether the key starts with the given raw prefix
    #[must_use]
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:?})", self.0)
    }
}

impl TryFrom<String> for Key {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Key {
    type Error = KeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when creating a key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("key cannot be empty or the root key")]
    Empty,
    #[error("key cannot exceed 1024 bytes")]
    TooLong,
    #[error("key contains invalid character: {0:?}")]
    InvalidChar(char),
    #[error("key cannot contain relative segment: {0}")]
    RelativeSegment(String),
}

/// Metadata record for one indexed object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub key: Key,
    /// Object size in bytes. Content blocks are small (256 KiB max in practice).
    pub size: u64,
}

impl Metadata {
    #[must_use]
    pub const fn new(key: Key, size: u64) -> Self {
        Self { key, size }
    }
}

/// Join a namespace prefix and a key into an object path
///
/// The prefix's trailing separators and the key's leading one are collapsed
/// into a single `/`. An empty prefix yields the bare relative key.
#[must_use]
pub fn object_path(prefix: &str, key: &Key) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        key.relative().to_string()
    } else {
        format!("{prefix}/{}", key.relative())
    }
}
