//! Configuration types.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BastionConfig {
    /// Asynchronous audit write path.
    pub audit: AuditSettings,
    /// Audit record storage.
    pub storage: StorageSettings,
    /// Logging output.
    pub logging: LoggingSettings,
}

/// Audit write path configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    /// Maximum records waiting in the write queue before new ones are dropped.
    pub queue_capacity: usize,
    /// Maximum records written per batch.
    pub batch_size: usize,
    /// Maximum age of a partial batch before it is written (ms).
    pub flush_interval_ms: u64,
    /// Retries for a transient write failure before the record is dropped.
    pub max_retries: u32,
    /// First retry delay (ms); doubles on every attempt.
    pub backoff_base_ms: u64,
    /// Upper bound for a single retry delay (ms).
    pub backoff_max_ms: u64,
    /// Maximum serialized metadata size per record.
    pub metadata_limit_bytes: usize,
    /// Consecutive failed writes after which the pipeline reports unhealthy.
    pub unhealthy_after_failures: u32,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 100,
            flush_interval_ms: 50,
            max_retries: 5,
            backoff_base_ms: 20,
            backoff_max_ms: 2_000,
            metadata_limit_bytes: 64 * 1024,
            unhealthy_after_failures: 10,
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local store, lost on exit.
    #[default]
    Memory,
    /// SQLite database file.
    Sqlite,
}

/// Audit storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Which backend to use.
    pub backend: StorageBackend,
    /// Path to the SQLite database file.
    pub database_path: String,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// Busy timeout for a locked database (ms).
    pub busy_timeout_ms: u64,
    /// Records fetched per page by the lazy query stream.
    pub page_size: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_path: "bastion-audit.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5_000,
            page_size: 256,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Output format (`pretty`, `compact`, `json`).
    pub format: String,
    /// Optional log file, written in addition to stderr.
    pub file: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}
