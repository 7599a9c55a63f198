//! Integrity chain verification.

use crate::{AuditSink, SinkError};
use bastion_audit_types::{AuditFilter, GENESIS_HASH};
use futures::StreamExt;
use thiserror::Error;
use tracing::warn;

/// Chain verification errors.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A record's content no longer matches its hash.
    #[error("audit record {sequence} fails its seal")]
    InvalidSeal { sequence: u64 },

    /// A record does not chain to its predecessor.
    #[error("audit chain broken at record {sequence}")]
    Broken { sequence: u64 },

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Walk every stored record and check seals and links.
///
/// Returns the number of records verified.
pub async fn verify_chain<S>(sink: &S) -> Result<u64, ChainError>
where
    S: AuditSink + ?Sized,
{
    let mut records = sink.query(AuditFilter::new());
    let mut prev_hash = GENESIS_HASH.to_string();
    let mut expected_sequence = 1;
    let mut verified = 0;

    while let Some(record) = records.next().await {
        let record = record?;
        if !record.verify_seal() {
            warn!(sequence = record.sequence, "Audit record fails its seal");
            return Err(ChainError::InvalidSeal {
                sequence: record.sequence,
            });
        }
        if record.seal.prev_hash != prev_hash || record.sequence != expected_sequence {
            warn!(sequence = record.sequence, "Audit chain broken");
            return Err(ChainError::Broken {
                sequence: record.sequence,
            });
        }
        prev_hash = record.seal.hash;
        expected_sequence = record.sequence + 1;
        verified += 1;
    }

    Ok(verified)
}
