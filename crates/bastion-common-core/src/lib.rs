//! Bastion common core types and utilities.

pub mod id;

pub use id::{AuditRecordId, IdParseError, SubjectId};
