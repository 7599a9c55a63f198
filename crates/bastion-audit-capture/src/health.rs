//! Writer health signal.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use strum::{AsRefStr, Display};

/// Lifecycle of the audit writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WriterState {
    /// Spawned but not yet running.
    Uninitialized,
    /// Accepting and writing events.
    Ready,
    /// No longer accepting; writing what was already queued.
    Draining,
    /// Finished.
    Stopped,
}

/// Why an event was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DropReason {
    /// The queue was at capacity.
    QueueFull,
    /// The writer had already stopped accepting events.
    Closed,
    /// The sink failed permanently or retries ran out.
    WriteFailed,
}

/// Dropped-event counters by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    pub queue_full: u64,
    pub closed: u64,
    pub write_failed: u64,
}

impl DropCounts {
    /// Sum over all reasons.
    pub fn total(&self) -> u64 {
        self.queue_full + self.closed + self.write_failed
    }
}

/// Point-in-time view of the write path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditHealth {
    pub state: WriterState,
    /// Events accepted into the queue.
    pub submitted: u64,
    /// Events durably written.
    pub written: u64,
    pub dropped: DropCounts,
    /// Individual record retries.
    pub retries: u64,
    /// Failed record writes since the last success.
    pub consecutive_failures: u32,
    pub last_failure: Option<String>,
    /// Events waiting in the queue.
    pub queued: usize,
    #[serde(skip)]
    unhealthy_after: u32,
}

impl AuditHealth {
    /// Whether audit records are still reaching storage.
    ///
    /// False once the writer has stopped or the sink keeps failing.
    pub fn is_healthy(&self) -> bool {
        matches!(self.state, WriterState::Ready | WriterState::Draining)
            && self.consecutive_failures < self.unhealthy_after
    }
}

/// Counters shared by handles and the writer task.
#[derive(Debug)]
pub(crate) struct Stats {
    state: Mutex<WriterState>,
    submitted: AtomicU64,
    written: AtomicU64,
    dropped_queue_full: AtomicU64,
    dropped_closed: AtomicU64,
    dropped_write_failed: AtomicU64,
    retries: AtomicU64,
    consecutive_failures: AtomicU32,
    last_failure: Mutex<Option<String>>,
    unhealthy_after: u32,
}

impl Stats {
    pub(crate) fn new(unhealthy_after: u32) -> Self {
        Self {
            state: Mutex::new(WriterState::Uninitialized),
            submitted: AtomicU64::new(0),
            written: AtomicU64::new(0),
            dropped_queue_full: AtomicU64::new(0),
            dropped_closed: AtomicU64::new(0),
            dropped_write_failed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            last_failure: Mutex::new(None),
            unhealthy_after: unhealthy_after.max(1),
        }
    }

    pub(crate) fn set_state(&self, state: WriterState) {
        *self.state.lock() = state;
    }

    pub(crate) fn state(&self) -> WriterState {
        *self.state.lock()
    }

    pub(crate) fn submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn written(&self, count: u64) {
        if count > 0 {
            self.written.fetch_add(count, Ordering::Relaxed);
            self.consecutive_failures.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn dropped(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::QueueFull => &self.dropped_queue_full,
            DropReason::Closed => &self.dropped_closed,
            DropReason::WriteFailed => &self.dropped_write_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn retried(&self, count: u64) {
        self.retries.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn write_failed(&self, message: String) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        *self.last_failure.lock() = Some(message);
    }

    pub(crate) fn snapshot(&self, queued: usize) -> AuditHealth {
        AuditHealth {
            state: self.state(),
            submitted: self.submitted.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            dropped: DropCounts {
                queue_full: self.dropped_queue_full.load(Ordering::Relaxed),
                closed: self.dropped_closed.load(Ordering::Relaxed),
                write_failed: self.dropped_write_failed.load(Ordering::Relaxed),
            },
            retries: self.retries.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_failure: self.last_failure.lock().clone(),
            queued,
            unhealthy_after: self.unhealthy_after,
        }
    }
}
