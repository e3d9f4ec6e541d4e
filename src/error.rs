//! Error taxonomy shared across the crate. Domain errors are concrete
//! `thiserror` types; they are wrapped in `anyhow::Result` only at the
//! binary boundary (`main.rs`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("per-shard budget {per_shard} bytes is out of range [{min}, {max}]")]
    PerShardBudgetOutOfRange {
        per_shard: usize,
        min: usize,
        max: usize,
    },
    #[error("shard count must be at least 1")]
    ZeroShards,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: String, reason: String },
}
