//! Audit record types for Bastion.
//!
//! An [`AuditEvent`] is what callers describe; an [`AuditRecord`] is what a
//! sink stores once it has assigned a sequence number, a timestamp and a seal.

mod action;
mod event;
mod filter;
mod metadata;
mod record;

pub use action::AuditAction;
pub use event::{AuditEvent, AuditEventBuilder, AuditTarget};
pub use filter::AuditFilter;
pub use metadata::{AuditMetadata, DEFAULT_METADATA_LIMIT};
pub use record::{AuditRecord, RecordSeal, GENESIS_HASH};

pub use bastion_common_core::{AuditRecordId, SubjectId};
