//! Test utilities for Bastion crates.

use bastion_audit_capture::{
    ActionAuditor, AuditHandle, AuditHealth, AuditWriter, AuditWriterTask, CaptureConfig,
};
use bastion_audit_sink::{AuditSink, MemoryAuditSink};
use bastion_audit_types::{AuditFilter, AuditRecord};
use bastion_common_core::SubjectId;
use bastion_rbac::{Principal, Role};
use futures::TryStreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Upper bound used when waiting for asynchronous audit writes.
pub const AUDIT_VISIBILITY: Duration = Duration::from_secs(2);

/// Creates a temporary directory that is cleaned up on drop.
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Parse a subject id.
pub fn subject(s: &str) -> SubjectId {
    SubjectId::parse(s).expect("valid subject")
}

/// A principal holding a known role.
pub fn principal(s: &str, role: Role) -> Principal {
    Principal::new(subject(s), role)
}

/// Writer settings that flush quickly in tests.
pub fn fast_capture_config() -> CaptureConfig {
    CaptureConfig {
        flush_interval: Duration::from_millis(5),
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(10),
        ..CaptureConfig::default()
    }
}

/// In-memory sink with a running writer.
pub struct AuditStack {
    pub sink: Arc<MemoryAuditSink>,
    pub handle: AuditHandle,
    task: AuditWriterTask,
}

impl AuditStack {
    /// Spawn with [`fast_capture_config`].
    pub fn memory() -> Self {
        Self::with_config(fast_capture_config())
    }

    /// Spawn with a specific writer configuration.
    pub fn with_config(config: CaptureConfig) -> Self {
        let sink = Arc::new(MemoryAuditSink::new());
        let (handle, task) = AuditWriter::spawn(sink.clone(), config);
        Self { sink, handle, task }
    }

    /// An auditor writing through this stack.
    pub fn auditor(&self) -> ActionAuditor {
        ActionAuditor::new(self.handle.clone())
    }

    /// Everything currently stored that matches `filter`.
    pub async fn records(&self, filter: AuditFilter) -> Vec<AuditRecord> {
        collect(self.sink.as_ref(), filter).await
    }

    /// Wait until at least `count` records match `filter`, then return them.
    pub async fn wait_for(&self, filter: AuditFilter, count: usize) -> Vec<AuditRecord> {
        let sink = self.sink.clone();
        let found = eventually(AUDIT_VISIBILITY, || {
            let sink = sink.clone();
            let filter = filter.clone();
            async move { collect(sink.as_ref(), filter).await.len() >= count }
        })
        .await;
        assert!(found, "expected {} audit records within {:?}", count, AUDIT_VISIBILITY);
        self.records(filter).await
    }

    /// Drain the writer and return its final health.
    pub async fn shutdown(self) -> (Arc<MemoryAuditSink>, AuditHealth) {
        let health = self.task.shutdown().await;
        (self.sink, health)
    }
}

/// Collect a query into a vector, panicking on sink errors.
pub async fn collect<S: AuditSink + ?Sized>(sink: &S, filter: AuditFilter) -> Vec<AuditRecord> {
    sink.query(filter).try_collect().await.expect("audit query failed")
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Assert that a Result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
}

/// Assert that a Result is Err and return the error.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
            Err(e) => e,
        }
    };
}
