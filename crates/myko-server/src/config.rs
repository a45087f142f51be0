//! Myko configuration
//!
//! Layered: defaults, then an optional file (`MYKO_CONFIG`, default
//! `myko.yaml`), then `MYKO_`-prefixed environment variables using `__` as the
//! section separator, e.g. `MYKO_FLUSH__BUFFER_SIZE=4096`.

use std::time::Duration;

use config::{Config, Environment, File};
use myko_aggregator::{FlushMode, WriterConfig};
use myko_common::{MykoError, Result, MAX_TTL_SECS};
use serde::{Deserialize, Serialize};

/// Config file used when `MYKO_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "myko.yaml";

/// Myko service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MykoConfig {
    /// HTTP listen address
    pub listen: String,
    /// Storage backend
    pub data: DataSettings,
    /// Batch writer thresholds
    pub flush: FlushSettings,
    /// Entry admission
    pub ingest: IngestSettings,
}

impl Default for MykoConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:6959".to_string(),
            data: DataSettings::default(),
            flush: FlushSettings::default(),
            ingest: IngestSettings::default(),
        }
    }
}

impl MykoConfig {
    /// Load configuration from `.env`, the config file and the environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = std::env::var("MYKO_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let builder = Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(
                Environment::with_prefix("MYKO")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_config(builder.build())
    }

    /// Load configuration from a single file, without the environment
    pub fn from_file(path: &str) -> Result<Self> {
        let built = Config::builder()
            .add_source(File::with_name(path))
            .build();
        Self::from_config(built)
    }

    fn from_config(built: std::result::Result<Config, config::ConfigError>) -> Result<Self> {
        let cfg: Self = built
            .and_then(|c| c.try_deserialize())
            .map_err(|e| MykoError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen.trim().is_empty() {
            return Err(MykoError::Config("listen address is empty".into()));
        }
        if self.flush.buffer_size == 0 {
            return Err(MykoError::Config("flush.buffer_size must be positive".into()));
        }
        if self.data.ttl_secs.is_some_and(|ttl| ttl == 0 || ttl > MAX_TTL_SECS) {
            return Err(MykoError::Config(format!(
                "data.ttl_secs must be between 1 and {MAX_TTL_SECS}"
            )));
        }
        if self.data.timeout_ms == 0 {
            return Err(MykoError::Config("data.timeout_ms must be positive".into()));
        }
        Ok(())
    }

    /// Batch writer settings derived from the flush and data sections
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            buffer_size: self.flush.buffer_size,
            flush_interval: Duration::from_millis(self.flush.interval_ms),
            mode: self.flush.mode,
            backend_timeout: self.data.timeout(),
        }
    }
}

/// Which sink to bind at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Redis,
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub backend: BackendKind,
    /// Deadline for every sink call (milliseconds)
    pub timeout_ms: u64,
    /// TTL applied to ingested rows (seconds); rows never expire when unset
    pub ttl_secs: Option<u64>,
    pub redis: RedisSettings,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            timeout_ms: 10_000,
            ttl_secs: None,
            redis: RedisSettings::default(),
        }
    }
}

impl DataSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Redis connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub url: String,
    pub prefix: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            prefix: "myko".to_string(),
        }
    }
}

/// Flush thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushSettings {
    /// Distinct buffered keys that trigger a flush
    pub buffer_size: usize,
    /// Time since the last successful flush that triggers a flush (milliseconds)
    pub interval_ms: u64,
    pub mode: FlushMode,
}

impl Default for FlushSettings {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            interval_ms: 5_000,
            mode: FlushMode::Blocking,
        }
    }
}

/// Entry admission settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Rewrite key delimiters instead of rejecting entries (legacy mode)
    pub escape: bool,
}
