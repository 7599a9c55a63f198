//! Batch collection for sink writes.

use bastion_audit_types::AuditEvent;
use std::time::Duration;
use tokio::time::Instant;

/// An event waiting in the writer queue.
#[derive(Debug)]
pub struct QueuedEvent {
    pub event: AuditEvent,
    pub queued_at: Instant,
}

impl QueuedEvent {
    pub(crate) fn new(event: AuditEvent) -> Self {
        Self {
            event,
            queued_at: Instant::now(),
        }
    }
}

/// Events collected for one sink write.
#[derive(Debug, Default)]
pub struct EventBatch {
    pub events: Vec<QueuedEvent>,
    /// When the first event entered the batch.
    pub opened_at: Option<Instant>,
}

impl EventBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

/// Aggregates events until the batch is full or old enough.
#[derive(Debug)]
pub struct BatchCollector {
    max_size: usize,
    max_age: Duration,
    current: EventBatch,
}

impl BatchCollector {
    /// Create a new collector.
    pub fn new(max_size: usize, max_age: Duration) -> Self {
        Self {
            max_size: max_size.max(1),
            max_age,
            current: EventBatch::default(),
        }
    }

    /// Add an event; returns the batch when it is ready to write.
    pub fn add(&mut self, event: QueuedEvent) -> Option<EventBatch> {
        if self.current.opened_at.is_none() {
            self.current.opened_at = Some(Instant::now());
        }
        self.current.events.push(event);

        if self.current.len() >= self.max_size || self.is_due() {
            Some(self.take_batch())
        } else {
            None
        }
    }

    /// Whether a non-empty batch has reached its age limit.
    pub fn is_due(&self) -> bool {
        self.current
            .opened_at
            .map(|opened| opened.elapsed() >= self.max_age)
            .unwrap_or(false)
    }

    /// Take the current batch and reset.
    pub fn take_batch(&mut self) -> EventBatch {
        std::mem::take(&mut self.current)
    }

    /// Check if there are pending events.
    pub fn has_pending(&self) -> bool {
        !self.current.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_audit_types::{AuditAction, AuditTarget};

    fn queued() -> QueuedEvent {
        QueuedEvent::new(
            AuditEvent::builder(AuditAction::HttpRequest, AuditTarget::route("/")).build(),
        )
    }

    #[tokio::test]
    async fn test_flushes_on_size() {
        let mut collector = BatchCollector::new(3, Duration::from_secs(60));
        assert!(collector.add(queued()).is_none());
        assert!(collector.add(queued()).is_none());
        let batch = collector.add(queued()).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(!collector.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_age_starts_at_first_event() {
        let mut collector = BatchCollector::new(100, Duration::from_millis(50));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!collector.is_due());

        assert!(collector.add(queued()).is_none());
        assert!(!collector.is_due());

        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(collector.is_due());
        assert_eq!(collector.take_batch().len(), 1);
        assert!(!collector.is_due());
    }
}
