//! Sink error taxonomy.

use bastion_common_core::AuditRecordId;
use thiserror::Error;

/// Audit sink errors.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// The backend cannot be reached right now.
    #[error("audit store unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer in time.
    #[error("audit store timed out: {0}")]
    Timeout(String),

    /// A record with this id is already stored.
    #[error("audit record {0} already stored")]
    Duplicate(AuditRecordId),

    /// The backend refused the write.
    #[error("audit write rejected: {0}")]
    Rejected(String),

    /// The record could not be encoded.
    #[error("audit record serialization failed: {0}")]
    Serialization(String),

    /// Stored data could not be decoded or failed an integrity check.
    #[error("audit store corrupt: {0}")]
    Corrupt(String),
}

impl SinkError {
    /// Whether retrying the same write may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }

    /// Whether the write should be considered done.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<sqlx::Error> for SinkError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut => Self::Timeout(e.to_string()),
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                Self::Unavailable(e.to_string())
            }
            sqlx::Error::Database(ref db) => {
                // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes
                let busy = db
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| matches!(code & 0xff, 5 | 6))
                    .unwrap_or(false);
                if busy {
                    Self::Unavailable(e.to_string())
                } else {
                    Self::Rejected(e.to_string())
                }
            }
            sqlx::Error::RowNotFound
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_) => Self::Corrupt(e.to_string()),
            other => Self::Rejected(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SinkError::Unavailable("down".into()).is_transient());
        assert!(SinkError::Timeout("slow".into()).is_transient());
        assert!(!SinkError::Rejected("schema".into()).is_transient());
        assert!(!SinkError::Corrupt("bad row".into()).is_transient());
        assert!(!SinkError::Duplicate(AuditRecordId::new()).is_transient());
    }

    #[test]
    fn test_sqlx_mapping() {
        assert!(matches!(
            SinkError::from(sqlx::Error::PoolTimedOut),
            SinkError::Timeout(_)
        ));
        assert!(matches!(
            SinkError::from(sqlx::Error::PoolClosed),
            SinkError::Unavailable(_)
        ));
        assert!(matches!(
            SinkError::from(sqlx::Error::RowNotFound),
            SinkError::Corrupt(_)
        ));
    }
}
