//! Asynchronous audit write path for Bastion.
//!
//! Callers hand events to an [`AuditHandle`], which never blocks and never
//! fails the caller. A single writer task batches the events, writes them
//! to the [`AuditSink`](bastion_audit_sink::AuditSink) with bounded retry
//! and reports what it could not write through [`AuditHealth`] and
//! `tracing`.
//!
//! - Bounded queue with drop-and-log when saturated
//! - Size/age batching
//! - Exponential backoff for transient sink errors
//! - Drain on shutdown
//! - [`ActionAuditor`] for business events after a committed mutation

mod auditor;
mod batch;
mod config;
mod health;
mod retry;
mod writer;

pub use auditor::ActionAuditor;
pub use batch::{BatchCollector, EventBatch, QueuedEvent};
pub use config::CaptureConfig;
pub use health::{AuditHealth, DropCounts, DropReason, WriterState};
pub use retry::Backoff;
pub use writer::{AuditHandle, AuditWriter, AuditWriterTask};

pub use bastion_audit_types::{AuditAction, AuditEvent, AuditMetadata, AuditTarget};
