//! Append-only audit storage for Bastion.
//!
//! The [`AuditSink`] trait has no update or delete operation. Removing an
//! actor goes through the separate [`ActorDirectory`] trait and only ever
//! detaches the actor from existing records.

mod clock;
mod error;
mod memory;
mod sink;
mod sqlite;
mod verify;

pub use error::SinkError;
pub use memory::MemoryAuditSink;
pub use sink::{paginate, ActorDirectory, AuditSink, RecordStream, DEFAULT_PAGE_SIZE};
pub use sqlite::{SqliteAuditSink, SqliteSinkConfig};
pub use verify::{verify_chain, ChainError};

use bastion_common_config::{StorageBackend, StorageSettings};
use std::sync::Arc;

/// A store that is both an audit sink and the actor directory it references.
pub trait AuditStore: AuditSink + ActorDirectory {}

impl<T: AuditSink + ActorDirectory> AuditStore for T {}

/// Open the backend selected by the `storage` configuration section.
pub async fn open_store(settings: &StorageSettings) -> Result<Arc<dyn AuditStore>, SinkError> {
    match settings.backend {
        StorageBackend::Memory => Ok(Arc::new(
            MemoryAuditSink::new().with_page_size(settings.page_size),
        )),
        StorageBackend::Sqlite => {
            let sink = SqliteAuditSink::open(SqliteSinkConfig::from(settings)).await?;
            Ok(Arc::new(sink))
        }
    }
}
