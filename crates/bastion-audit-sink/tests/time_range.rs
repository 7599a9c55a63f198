//! Time-range filters select the same records on every backend.

use bastion_audit_sink::{AuditSink, MemoryAuditSink, SqliteAuditSink, SqliteSinkConfig};
use bastion_audit_types::{AuditAction, AuditEvent, AuditFilter, AuditTarget};
use bastion_test_utils::{assert_ok, collect};
use chrono::Duration;

/// Hits for ranges ending just after, starting just after, starting exactly
/// at and ending exactly at the stored timestamp.
async fn range_hits<S: AuditSink + ?Sized>(sink: &S) -> [usize; 4] {
    let event = AuditEvent::builder(AuditAction::Update, AuditTarget::new("resource", "r-1"))
        .build();
    assert_ok!(sink.append(event).await);

    let stored = collect(sink, AuditFilter::new()).await;
    let t = stored[0].recorded_at;
    let half_micro = Duration::nanoseconds(500);
    let second = Duration::seconds(1);

    let filters = [
        AuditFilter::new().between(t - second, t + half_micro),
        AuditFilter::new().between(t + half_micro, t + second),
        AuditFilter::new().between(t, t + second),
        AuditFilter::new().between(t - second, t),
    ];

    let mut hits = [0; 4];
    for (slot, filter) in hits.iter_mut().zip(filters) {
        *slot = collect(sink, filter.clone()).await.len();
        assert_eq!(*slot, usize::from(filter.matches(&stored[0])));
    }
    hits
}

#[tokio::test]
async fn time_range_bounds_agree_across_backends() {
    let memory = range_hits(&MemoryAuditSink::new()).await;

    let sqlite_sink = assert_ok!(SqliteAuditSink::open(SqliteSinkConfig::in_memory()).await);
    let sqlite = range_hits(&sqlite_sink).await;
    sqlite_sink.close().await;

    assert_eq!(memory, [1, 0, 1, 0]);
    assert_eq!(sqlite, memory);
}
