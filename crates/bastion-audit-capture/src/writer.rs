//! The audit writer task and its submission handle.

use crate::batch::{BatchCollector, EventBatch, QueuedEvent};
use crate::health::{AuditHealth, DropReason, Stats, WriterState};
use crate::retry::Backoff;
use crate::CaptureConfig;
use bastion_audit_sink::{AuditSink, SinkError};
use bastion_audit_types::AuditEvent;
use bastion_common_core::AuditRecordId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Cheap, cloneable handle for submitting audit events.
#[derive(Clone)]
pub struct AuditHandle {
    sender: mpsc::Sender<QueuedEvent>,
    stats: Arc<Stats>,
    metadata_limit: usize,
}

impl AuditHandle {
    /// Queue an event for writing without waiting.
    ///
    /// Applies the metadata bound and pre-assigns the record id, which is
    /// returned when the event was accepted. A full or closed queue drops the
    /// event; the drop is counted and logged but never reported to the
    /// caller as an error.
    pub fn submit(&self, mut event: AuditEvent) -> Option<AuditRecordId> {
        let id = event.ensure_id();

        let original_bytes = event.metadata.serialized_len();
        if original_bytes > self.metadata_limit {
            event.metadata = std::mem::take(&mut event.metadata).bounded(self.metadata_limit);
            warn!(
                event = "audit_metadata_truncated",
                record_id = %id,
                original_bytes,
                limit = self.metadata_limit,
                "Audit metadata truncated"
            );
        }

        let action = event.action;
        match self.sender.try_send(QueuedEvent::new(event)) {
            Ok(()) => {
                self.stats.submitted();
                debug!(record_id = %id, %action, "Audit event queued");
                Some(id)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dropped(DropReason::QueueFull);
                warn!(
                    event = "audit_dropped",
                    reason = DropReason::QueueFull.as_ref(),
                    record_id = %id,
                    %action,
                    "Audit queue full, event dropped"
                );
                None
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped(DropReason::Closed);
                error!(
                    event = "audit_dropped",
                    reason = DropReason::Closed.as_ref(),
                    record_id = %id,
                    %action,
                    "Audit writer stopped, event dropped"
                );
                None
            }
        }
    }

    /// Current health snapshot.
    pub fn health(&self) -> AuditHealth {
        self.stats.snapshot(self.queued())
    }

    /// Whether audit records are still reaching storage.
    pub fn is_healthy(&self) -> bool {
        self.health().is_healthy()
    }

    /// Events waiting in the queue.
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

/// Owner of the running writer task.
pub struct AuditWriterTask {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
    stats: Arc<Stats>,
}

impl AuditWriterTask {
    /// Current health snapshot.
    pub fn health(&self) -> AuditHealth {
        self.stats.snapshot(0)
    }

    /// Stop accepting events, write everything already queued, flush the
    /// sink and return the final health.
    pub async fn shutdown(self) -> AuditHealth {
        if self.stats.state() != WriterState::Stopped {
            self.stats.set_state(WriterState::Draining);
        }
        let _ = self.shutdown.send(());
        if let Err(e) = self.join.await {
            error!(error = %e, "Audit writer task failed");
            self.stats.set_state(WriterState::Stopped);
        }
        let health = self.stats.snapshot(0);
        info!(
            written = health.written,
            dropped = health.dropped.total(),
            "Audit writer stopped"
        );
        health
    }
}

/// Spawns the audit writer.
pub struct AuditWriter;

impl AuditWriter {
    /// Spawn the writer on the current Tokio runtime.
    ///
    /// If the [`AuditWriterTask`] is dropped without calling
    /// [`shutdown`](AuditWriterTask::shutdown), the writer keeps running
    /// until every [`AuditHandle`] is gone.
    pub fn spawn(sink: Arc<dyn AuditSink>, config: CaptureConfig) -> (AuditHandle, AuditWriterTask) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stats = Arc::new(Stats::new(config.unhealthy_after_failures));

        let handle = AuditHandle {
            sender,
            stats: stats.clone(),
            metadata_limit: config.metadata_limit,
        };

        let worker = Worker {
            sink,
            backoff: Backoff::new(config.backoff_base, config.backoff_max),
            config,
            stats: stats.clone(),
        };
        let join = tokio::spawn(worker.run(receiver, shutdown_rx));

        (
            handle,
            AuditWriterTask {
                shutdown: shutdown_tx,
                join,
                stats,
            },
        )
    }
}

struct Worker {
    sink: Arc<dyn AuditSink>,
    config: CaptureConfig,
    backoff: Backoff,
    stats: Arc<Stats>,
}

impl Worker {
    async fn run(
        self,
        mut receiver: mpsc::Receiver<QueuedEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        self.stats.set_state(WriterState::Ready);
        info!(
            queue_capacity = self.config.queue_capacity,
            batch_size = self.config.batch_size,
            "Audit writer started"
        );

        let mut collector = BatchCollector::new(self.config.batch_size, self.config.flush_interval);
        let tick = (self.config.flush_interval / 2).max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut detached = false;

        loop {
            tokio::select! {
                signal = &mut shutdown, if !detached => match signal {
                    Ok(()) => break,
                    Err(_) => detached = true,
                },
                queued = receiver.recv() => match queued {
                    Some(queued) => {
                        if let Some(batch) = collector.add(queued) {
                            self.write_batch(batch).await;
                        }
                    }
                    None => break,
                },
                _ = interval.tick() => {
                    if collector.is_due() {
                        self.write_batch(collector.take_batch()).await;
                    }
                }
            }
        }

        self.stats.set_state(WriterState::Draining);
        receiver.close();
        while let Some(queued) = receiver.recv().await {
            if let Some(batch) = collector.add(queued) {
                self.write_batch(batch).await;
            }
        }
        if collector.has_pending() {
            self.write_batch(collector.take_batch()).await;
        }
        if let Err(e) = self.sink.flush().await {
            error!(error = %e, "Audit sink flush failed during drain");
        }
        self.stats.set_state(WriterState::Stopped);
    }

    async fn write_batch(&self, batch: EventBatch) {
        if batch.is_empty() {
            return;
        }
        debug!(size = batch.len(), "Writing audit batch");

        let mut pending: Vec<AuditEvent> = batch.events.into_iter().map(|q| q.event).collect();
        let mut attempt = 0u32;

        loop {
            let results = self.sink.append_batch(pending.clone()).await;
            let mut written = 0u64;
            let mut retry = Vec::new();

            for (index, event) in pending.into_iter().enumerate() {
                let result = results.get(index).cloned().unwrap_or_else(|| {
                    Err(SinkError::Rejected("sink returned no result".to_string()))
                });
                match result {
                    Ok(_) => written += 1,
                    Err(SinkError::Duplicate(_)) => written += 1,
                    Err(e) => {
                        self.stats.write_failed(e.to_string());
                        if e.is_transient() && attempt < self.config.max_retries {
                            retry.push(event);
                        } else {
                            self.drop_failed(&event, &e, attempt);
                        }
                    }
                }
            }
            self.stats.written(written);

            if retry.is_empty() {
                return;
            }

            let delay = self.backoff.delay(attempt);
            self.stats.retried(retry.len() as u64);
            warn!(
                event = "audit_write_retry",
                pending = retry.len(),
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Transient audit write failure, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
            pending = retry;
        }
    }

    fn drop_failed(&self, event: &AuditEvent, e: &SinkError, attempt: u32) {
        self.stats.dropped(DropReason::WriteFailed);
        error!(
            event = "audit_dropped",
            reason = DropReason::WriteFailed.as_ref(),
            record_id = ?event.id,
            action = %event.action,
            entity_type = %event.target.entity_type,
            entity_id = %event.target.entity_id,
            attempts = attempt + 1,
            error = %e,
            "Audit record dropped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_audit_sink::MemoryAuditSink;
    use bastion_audit_types::{AuditAction, AuditFilter, AuditTarget};
    use futures::TryStreamExt;

    fn event(n: usize) -> AuditEvent {
        AuditEvent::builder(AuditAction::Create, AuditTarget::new("resource", n.to_string()))
            .build()
    }

    fn config() -> CaptureConfig {
        CaptureConfig {
            batch_size: 4,
            flush_interval: Duration::from_millis(10),
            backoff_base: Duration::from_millis(5),
            backoff_max: Duration::from_millis(40),
            ..CaptureConfig::default()
        }
    }

    async fn stored(sink: &MemoryAuditSink) -> usize {
        let records: Vec<_> = sink.query(AuditFilter::new()).try_collect().await.unwrap();
        records.len()
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let sink = Arc::new(MemoryAuditSink::new());
        let (handle, task) = AuditWriter::spawn(sink.clone(), config());

        for n in 0..10 {
            assert!(handle.submit(event(n)).is_some());
        }
        let health = task.shutdown().await;

        assert_eq!(health.state, WriterState::Stopped);
        assert_eq!(health.written, 10);
        assert_eq!(stored(&sink).await, 10);
        assert!(!handle.is_healthy());
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_dropped() {
        let sink = Arc::new(MemoryAuditSink::new());
        let (handle, task) = AuditWriter::spawn(sink.clone(), config());
        task.shutdown().await;

        assert!(handle.submit(event(1)).is_none());
        assert_eq!(handle.health().dropped.closed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_batch_flushes_by_age() {
        let sink = Arc::new(MemoryAuditSink::new());
        let (handle, task) = AuditWriter::spawn(sink.clone(), config());

        handle.submit(event(1));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(stored(&sink).await, 1);
        task.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let sink = Arc::new(MemoryAuditSink::new());
        sink.fail_next(3, true);
        let (handle, task) = AuditWriter::spawn(sink.clone(), config());

        handle.submit(event(1));
        let health = task.shutdown().await;

        assert_eq!(health.written, 1);
        assert_eq!(health.retries, 3);
        assert_eq!(health.dropped.total(), 0);
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(stored(&sink).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let sink = Arc::new(MemoryAuditSink::new());
        sink.fail_next(100, true);
        let config = CaptureConfig {
            max_retries: 2,
            unhealthy_after_failures: 3,
            ..config()
        };
        let (handle, task) = AuditWriter::spawn(sink.clone(), config);

        handle.submit(event(1));
        tokio::time::sleep(Duration::from_millis(200)).await;
        let health = handle.health();
        assert_eq!(health.dropped.write_failed, 1);
        assert_eq!(health.retries, 2);
        assert!(!health.is_healthy());

        task.shutdown().await;
        assert_eq!(stored(&sink).await, 0);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let sink = Arc::new(MemoryAuditSink::new());
        sink.fail_next(1, false);
        let (handle, task) = AuditWriter::spawn(sink.clone(), config());

        handle.submit(event(1));
        handle.submit(event(2));
        let health = task.shutdown().await;

        assert_eq!(health.retries, 0);
        assert_eq!(health.dropped.write_failed, 1);
        assert_eq!(health.written, 1);
        assert_eq!(health.last_failure.as_deref(), Some("audit write rejected: injected fault"));
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let sink = Arc::new(MemoryAuditSink::new());
        let config = CaptureConfig {
            queue_capacity: 2,
            ..config()
        };
        let (handle, task) = AuditWriter::spawn(sink.clone(), config);

        // the writer cannot run until this task yields
        let accepted = (0..5).filter(|n| handle.submit(event(*n)).is_some()).count();
        assert_eq!(accepted, 2);
        assert_eq!(handle.health().dropped.queue_full, 3);

        let health = task.shutdown().await;
        assert_eq!(health.written, 2);
    }

    #[tokio::test]
    async fn test_oversized_metadata_is_truncated_not_dropped() {
        let sink = Arc::new(MemoryAuditSink::new());
        let config = CaptureConfig {
            metadata_limit: 1024,
            ..config()
        };
        let (handle, task) = AuditWriter::spawn(sink.clone(), config);

        let big = AuditEvent::builder(AuditAction::Update, AuditTarget::new("resource", "r-1"))
            .metadata("body", "x".repeat(8192))
            .build();
        handle.submit(big);
        task.shutdown().await;

        let records: Vec<_> = sink.query(AuditFilter::new()).try_collect().await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].metadata.is_truncated());
        assert!(records[0].metadata.serialized_len() <= 1024);
    }
}
