//! In-process audit sink.

use crate::clock::MonotonicClock;
use crate::sink::{ActorDirectory, AuditSink, DEFAULT_PAGE_SIZE};
use crate::SinkError;
use async_trait::async_trait;
use bastion_audit_types::{AuditEvent, AuditFilter, AuditRecord, GENESIS_HASH};
use bastion_common_core::{AuditRecordId, SubjectId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

#[derive(Default)]
struct Store {
    records: Vec<AuditRecord>,
    by_id: HashMap<AuditRecordId, usize>,
    clock: MonotonicClock,
}

#[derive(Debug, Default)]
struct Faults {
    remaining: usize,
    transient: bool,
}

/// Audit sink backed by process memory.
///
/// Nothing survives a restart; intended for tests and single-process
/// development setups.
pub struct MemoryAuditSink {
    store: RwLock<Store>,
    faults: Mutex<Faults>,
    page_size: usize,
}

impl MemoryAuditSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self {
            store: RwLock::new(Store::default()),
            faults: Mutex::new(Faults::default()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Use a different query page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make the next `count` appends fail.
    ///
    /// Transient failures surface as [`SinkError::Unavailable`], permanent
    /// ones as [`SinkError::Rejected`].
    pub fn fail_next(&self, count: usize, transient: bool) {
        *self.faults.lock() = Faults {
            remaining: count,
            transient,
        };
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.store.read().records.len()
    }

    /// Whether nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn injected_fault(&self) -> Option<SinkError> {
        let mut faults = self.faults.lock();
        if faults.remaining == 0 {
            return None;
        }
        faults.remaining -= 1;
        Some(if faults.transient {
            SinkError::Unavailable("injected fault".to_string())
        } else {
            SinkError::Rejected("injected fault".to_string())
        })
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, mut event: AuditEvent) -> Result<AuditRecordId, SinkError> {
        if let Some(fault) = self.injected_fault() {
            return Err(fault);
        }

        let id = event.ensure_id();
        let mut store = self.store.write();
        if store.by_id.contains_key(&id) {
            return Err(SinkError::Duplicate(id));
        }

        let (sequence, prev_hash) = match store.records.last() {
            Some(last) => (last.sequence + 1, last.seal.hash.clone()),
            None => (1, GENESIS_HASH.to_string()),
        };
        let recorded_at = store.clock.next();
        let record = AuditRecord::seal(event, sequence, recorded_at, &prev_hash);

        let index = store.records.len();
        store.records.push(record);
        store.by_id.insert(id, index);
        Ok(id)
    }

    async fn fetch_page(
        &self,
        filter: &AuditFilter,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, SinkError> {
        let after = after.max(filter.after).unwrap_or(0);
        let store = self.store.read();
        // sequences start at 1 and are dense, so `after` is also a vec index
        let start = usize::try_from(after).unwrap_or(usize::MAX);
        Ok(store
            .records
            .iter()
            .skip(start)
            .filter(|record| filter.matches(record))
            .take(limit)
            .cloned()
            .collect())
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}

#[async_trait]
impl ActorDirectory for MemoryAuditSink {
    async fn remove_actor(&self, subject: &SubjectId) -> Result<u64, SinkError> {
        let mut store = self.store.write();
        let mut detached = 0;
        for record in store.records.iter_mut() {
            if record.actor.as_ref() == Some(subject) {
                record.actor = None;
                detached += 1;
            }
        }
        Ok(detached)
    }
}
