//! BucketDS Common - Shared types and utilities
//!
//! This crate provides the key and metadata types, error definitions, and
//! the validated datastore configuration used across all BucketDS components.

pub mod config;
pub mod error;
pub mod types;

pub use config::{BackendKind, DatastoreConfig};
pub use error::{BoxError, Error, Result};
pub use types::*;
