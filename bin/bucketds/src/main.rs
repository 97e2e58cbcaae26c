//! BucketDS CLI - Admin Command Line Interface
//!
//! Opens a datastore against the configured bucket, loads its metadata and
//! runs a single datastore operation.

use anyhow::{Context, Result};
use bucketds_common::{BackendKind, DatastoreConfig, Key};
use bucketds_store::{BucketDatastore, Entry, ObjectStoreRemote, Query};
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "bucketds")]
#[command(about = "BucketDS Admin CLI")]
#[command(version)]
struct Args {
    /// Datastore configuration file (TOML)
    #[arg(short, long, env = "BUCKETDS_CONFIG")]
    config: Option<PathBuf>,

    /// Bucket name (overrides the config file)
    #[arg(short, long, env = "BUCKETDS_BUCKET")]
    bucket: Option<String>,

    /// Key prefix within the bucket
    #[arg(long)]
    prefix: Option<String>,

    /// Remote backend
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Root directory for the local backend
    #[arg(long)]
    local_root: Option<PathBuf>,

    /// Data cache capacity in items
    #[arg(long)]
    cache_size: Option<usize>,

    /// Skip the metadata bulk load
    #[arg(long)]
    no_load: bool,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    Gcs,
    Local,
    Memory,
}

impl From<Backend> for BackendKind {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Gcs => Self::Gcs,
            Backend::Local => Self::Local,
            Backend::Memory => Self::Memory,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a value
    Put {
        key: String,
        /// Inline value
        #[arg(conflicts_with = "file")]
        value: Option<String>,
        /// Read the value from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Print a value
    Get {
        key: String,
        /// Write the value to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check whether a key exists
    Has { key: String },
    /// Print the size of a value
    Size { key: String },
    /// Delete a key
    Delete { key: String },
    /// List keys under a prefix as JSON lines; values are hex encoded
    Query {
        #[arg(default_value = "/")]
        prefix: String,
        /// Maximum number of results (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        limit: usize,
        /// Include hex-encoded values (fetches every object)
        #[arg(long)]
        values: bool,
    },
    /// Show index and cache statistics
    Stats,
}

/// One query result as a JSON line
fn entry_line(entry: &Entry) -> serde_json::Value {
    let mut line = serde_json::json!({
        "key": entry.key.as_str(),
        "size": entry.size,
    });
    if let Some(value) = &entry.value {
        line["value_hex"] = hex::encode(value).into();
    }
    line
}

fn resolve_config(args: &Args) -> Result<DatastoreConfig> {
    let mut config = match (&args.config, &args.bucket) {
        (Some(path), _) => DatastoreConfig::from_file(path)?,
        (None, Some(bucket)) => DatastoreConfig::new(bucket.clone()),
        (None, None) => anyhow::bail!("either --config or --bucket is required"),
    };

    if let Some(bucket) = &args.bucket {
        config.bucket.clone_from(bucket);
    }
    if let Some(prefix) = &args.prefix {
        config.prefix.clone_from(prefix);
    }
    if let Some(backend) = args.backend {
        config.backend = backend.into();
    }
    if let Some(root) = &args.local_root {
        config.local_root = Some(root.clone());
    }
    if let Some(cache_size) = args.cache_size {
        config.cache_size = cache_size;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = resolve_config(&args)?;
    info!(
        "Bucket: {}, prefix: {}, backend: {:?}",
        config.bucket, config.prefix, config.backend
    );

    let remote = Arc::new(ObjectStoreRemote::from_config(&config)?);
    let datastore = BucketDatastore::open(config, remote)
        .await
        .context("failed to open datastore")?;
    if !args.no_load {
        datastore.load_metadata().await?;
    }

    match args.command {
        Commands::Put { key, value, file } => {
            let key = Key::new(&key)?;
            let value = match (value, file) {
                (Some(value), _) => Bytes::from(value),
                (None, Some(path)) => Bytes::from(
                    std::fs::read(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?,
                ),
                (None, None) => anyhow::bail!("a value or --file is required"),
            };
            let size = value.len();
            datastore.put(&key, value).await?;
            println!("Stored {key} ({size} bytes)");
        }
        Commands::Get { key, output } => {
            let key = Key::new(&key)?;
            let value = datastore.get(&key).await?;
            match output {
                Some(path) => std::fs::write(&path, &value)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => std::io::stdout().write_all(&value)?,
            }
        }
        Commands::Has { key } => {
            let key = Key::new(&key)?;
            println!("{}", datastore.has(&key));
        }
        Commands::Size { key } => {
            let key = Key::new(&key)?;
            println!("{}", datastore.get_size(&key)?);
        }
        Commands::Delete { key } => {
            let key = Key::new(&key)?;
            datastore.delete(&key).await?;
            println!("Deleted {key}");
        }
        Commands::Query {
            prefix,
            limit,
            values,
        } => {
            let mut query = Query::new(prefix).with_limit(limit);
            query.keys_only = !values;
            let mut results = datastore.query(query)?;
            while let Some(entry) = results.next().await {
                println!("{}", entry_line(&entry?));
            }
        }
        Commands::Stats => {
            let stats = datastore.cache_stats();
            println!("Datastore Stats");
            println!("===============");
            println!("Bucket:       {}", datastore.config().bucket);
            println!("Prefix:       {}", datastore.config().prefix);
            println!("Indexed keys: {}", datastore.len());
            println!("Cache size:   {}", datastore.config().cache_size);
            println!("Cache hits:   {}", stats.hits.load(Ordering::Relaxed));
            println!("Cache misses: {}", stats.misses.load(Ordering::Relaxed));
            println!("Evictions:    {}", stats.evictions.load(Ordering::Relaxed));
            println!("Hit ratio:    {:.2}", stats.hit_ratio());
        }
    }

    datastore.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_config_from_flags() {
        let args = Args::parse_from([
            "bucketds",
            "--bucket",
            "blocks",
            "--backend",
            "memory",
            "--cache-size",
            "10",
            "has",
            "/a",
        ]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.bucket, "blocks");
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.cache_size, 10);
    }

    #[test]
    fn test_entry_line_hex_encodes_values() {
        let entry = Entry {
            key: Key::new("/blocks/A").unwrap(),
            size: 3,
            value: Some(Bytes::from_static(&[0x00, 0xff, 0x80])),
        };
        let line = entry_line(&entry);
        assert_eq!(line["key"], "/blocks/A");
        assert_eq!(line["size"], 3);
        assert_eq!(line["value_hex"], "00ff80");

        let keys_only = Entry { value: None, ..entry };
        assert!(entry_line(&keys_only).get("value_hex").is_none());
    }

    #[test]
    fn test_resolve_config_requires_bucket() {
        let args = Args::parse_from(["bucketds", "stats"]);
        assert!(resolve_config(&args).is_err());
    }

    #[test]
    fn test_resolve_config_rejects_zero_cache() {
        let args = Args::parse_from(["bucketds", "-b", "x", "--cache-size", "0", "stats"]);
        assert!(resolve_config(&args).is_err());
    }
}
