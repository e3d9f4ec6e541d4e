//! Layered configuration (A1): built-in defaults, overridden by an optional
//! YAML file, overridden by CLI flags. Grounded on the defaults-then-file
//! layering of the lineage's `Config`, scaled down to this crate's much
//! smaller field set.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Auto,
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Auto,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub total_bytes: usize,
    pub shards: usize,
    pub low_watermark: usize,
    pub high_watermark: usize,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    pub max_queue: usize,
    pub threaded: bool,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:11211".to_string(),
            total_bytes: 64 * 1024 * 1024,
            shards: 16,
            low_watermark: 2,
            high_watermark: num_cpus::get().max(2),
            idle_timeout: Duration::from_millis(30_000),
            max_queue: 256,
            threaded: true,
            log: LogConfig::default(),
        }
    }
}

/// CLI-supplied values; `None` leaves the corresponding field at its
/// file/default value. Populated from [`crate::cli::Args`] in `main.rs`.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub listen_addr: Option<String>,
    pub total_bytes: Option<usize>,
    pub shards: Option<usize>,
    pub low_watermark: Option<usize>,
    pub high_watermark: Option<usize>,
    pub idle_timeout_ms: Option<u64>,
    pub max_queue: Option<usize>,
    pub threaded: Option<bool>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

impl Config {
    /// Reads `path` if given (defaults fill any field it omits, or the
    /// whole file if `path` is `None` or missing), then applies `overrides`,
    /// then validates.
    pub fn load(path: Option<&Path>, overrides: CliOverrides) -> Result<Config> {
        let mut cfg = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p).map_err(|source| ConfigError::Io {
                    path: p.display().to_string(),
                    source,
                })?;
                serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: p.display().to_string(),
                    source,
                })?
            }
            _ => Config::default(),
        };

        cfg.apply(overrides);
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }

    fn apply(&mut self, overrides: CliOverrides) {
        if let Some(v) = overrides.listen_addr {
            self.listen_addr = v;
        }
        if let Some(v) = overrides.total_bytes {
            self.total_bytes = v;
        }
        if let Some(v) = overrides.shards {
            self.shards = v;
        }
        if let Some(v) = overrides.low_watermark {
            self.low_watermark = v;
        }
        if let Some(v) = overrides.high_watermark {
            self.high_watermark = v;
        }
        if let Some(v) = overrides.idle_timeout_ms {
            self.idle_timeout = Duration::from_millis(v);
        }
        if let Some(v) = overrides.max_queue {
            self.max_queue = v;
        }
        if let Some(v) = overrides.threaded {
            self.threaded = v;
        }
        if let Some(v) = overrides.log_level {
            self.log.level = v;
        }
        if let Some(v) = overrides.log_format {
            self.log.format = v;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.shards == 0 {
            return Err(ConfigError::Invalid {
                field: "shards".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let per_shard = self.total_bytes / self.shards;
        if !(8..=1_048_576).contains(&per_shard) {
            return Err(ConfigError::Invalid {
                field: "total_bytes/shards".to_string(),
                reason: format!("per-shard budget {per_shard} bytes is out of range [8, 1048576]"),
            });
        }
        if self.low_watermark < 1 || self.low_watermark > self.high_watermark {
            return Err(ConfigError::Invalid {
                field: "low_watermark/high_watermark".to_string(),
                reason: "must satisfy 1 <= low <= high".to_string(),
            });
        }
        if self.max_queue < 1 {
            return Err(ConfigError::Invalid {
                field: "max_queue".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn is_prod(&self) -> bool {
        matches!(self.log.format, LogFormat::Json)
    }
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Auto
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn zero_shards_is_rejected() {
        let mut cfg = Config::default();
        cfg.shards = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn per_shard_budget_out_of_range_is_rejected() {
        let mut cfg = Config::default();
        cfg.total_bytes = 10;
        cfg.shards = 100;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn watermark_ordering_is_enforced() {
        let mut cfg = Config::default();
        cfg.low_watermark = 5;
        cfg.high_watermark = 2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn cli_overrides_win_over_defaults() {
        let overrides = CliOverrides {
            listen_addr: Some("0.0.0.0:9999".to_string()),
            ..Default::default()
        };
        let cfg = Config::load(None, overrides).unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:9999");
    }

    #[test]
    fn missing_file_path_falls_back_to_defaults() {
        let cfg = Config::load(Some(Path::new("/nonexistent/path.yaml")), CliOverrides::default()).unwrap();
        assert_eq!(cfg.listen_addr, Config::default().listen_addr);
    }
}
