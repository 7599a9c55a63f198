//! The audit sink contract.

use crate::SinkError;
use async_trait::async_trait;
use bastion_audit_types::{AuditEvent, AuditFilter, AuditRecord};
use bastion_common_core::{AuditRecordId, SubjectId};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;

/// Records fetched per page by [`AuditSink::query`] unless a sink overrides it.
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Lazy, finite sequence of stored records.
pub type RecordStream<'a> = BoxStream<'a, Result<AuditRecord, SinkError>>;

/// Durable, append-only store for audit records.
///
/// Implementations assign the sequence number, timestamp and seal; callers
/// may pre-assign the record id to make retries idempotent.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Durably store one event.
    ///
    /// Fails with [`SinkError::Duplicate`] when the event's id is already
    /// stored.
    async fn append(&self, event: AuditEvent) -> Result<AuditRecordId, SinkError>;

    /// Store several events, one result per event in input order.
    async fn append_batch(
        &self,
        events: Vec<AuditEvent>,
    ) -> Vec<Result<AuditRecordId, SinkError>> {
        let mut results = Vec::with_capacity(events.len());
        for event in events {
            results.push(self.append(event).await);
        }
        results
    }

    /// Up to `limit` matching records with a sequence greater than both
    /// `after` and `filter.after`, in sequence order.
    async fn fetch_page(
        &self,
        filter: &AuditFilter,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, SinkError>;

    /// Make everything appended so far durable.
    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Page size used by [`query`](Self::query).
    fn page_size(&self) -> usize {
        DEFAULT_PAGE_SIZE
    }

    /// Stream every matching record in sequence order.
    ///
    /// Nothing is read until the stream is polled. To resume, query again
    /// with [`AuditFilter::after`] set to the last sequence seen.
    fn query(&self, filter: AuditFilter) -> RecordStream<'_> {
        paginate(self, filter, self.page_size())
    }
}

/// The identity side of the actor reference.
#[async_trait]
pub trait ActorDirectory: Send + Sync {
    /// Remove an actor. Records that reference it survive with the actor
    /// cleared. Returns the number of records detached.
    async fn remove_actor(&self, subject: &SubjectId) -> Result<u64, SinkError>;
}

struct PageState {
    filter: AuditFilter,
    cursor: Option<u64>,
    buffer: VecDeque<AuditRecord>,
    exhausted: bool,
}

/// Keyset pagination over [`AuditSink::fetch_page`].
///
/// The stream ends after the first short page or the first error.
pub fn paginate<'a, S>(sink: &'a S, filter: AuditFilter, page_size: usize) -> RecordStream<'a>
where
    S: AuditSink + ?Sized,
{
    let page_size = page_size.max(1);
    let state = PageState {
        cursor: filter.after,
        filter,
        buffer: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(state, move |mut state| async move {
        loop {
            if let Some(record) = state.buffer.pop_front() {
                state.cursor = Some(record.sequence);
                return Some((Ok(record), state));
            }
            if state.exhausted {
                return None;
            }
            match sink.fetch_page(&state.filter, state.cursor, page_size).await {
                Ok(page) => {
                    state.exhausted = page.len() < page_size;
                    state.buffer.extend(page);
                }
                Err(e) => {
                    state.exhausted = true;
                    return Some((Err(e), state));
                }
            }
        }
    })
    .boxed()
}
