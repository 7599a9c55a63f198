//! Write path configuration.

use bastion_audit_types::DEFAULT_METADATA_LIMIT;
use bastion_common_config::AuditSettings;
use std::time::Duration;

/// Configuration for the audit writer.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Events buffered before new ones are dropped.
    pub queue_capacity: usize,
    /// Maximum events per sink write.
    pub batch_size: usize,
    /// Maximum age of a partial batch.
    pub flush_interval: Duration,
    /// Retries per record after a transient failure.
    pub max_retries: u32,
    /// First retry delay.
    pub backoff_base: Duration,
    /// Retry delay cap.
    pub backoff_max: Duration,
    /// Metadata size bound in bytes.
    pub metadata_limit: usize,
    /// Consecutive write failures before reporting unhealthy.
    pub unhealthy_after_failures: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 100,
            flush_interval: Duration::from_millis(50),
            max_retries: 5,
            backoff_base: Duration::from_millis(20),
            backoff_max: Duration::from_secs(2),
            metadata_limit: DEFAULT_METADATA_LIMIT,
            unhealthy_after_failures: 10,
        }
    }
}

impl From<&AuditSettings> for CaptureConfig {
    fn from(settings: &AuditSettings) -> Self {
        Self {
            queue_capacity: settings.queue_capacity.max(1),
            batch_size: settings.batch_size.max(1),
            flush_interval: Duration::from_millis(settings.flush_interval_ms.max(1)),
            max_retries: settings.max_retries,
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
            backoff_max: Duration::from_millis(settings.backoff_max_ms),
            metadata_limit: settings.metadata_limit_bytes,
            unhealthy_after_failures: settings.unhealthy_after_failures,
        }
    }
}
