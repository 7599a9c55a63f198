//! The write path end to end, against both sinks.

use bastion_audit_capture::{ActionAuditor, AuditWriter, WriterState};
use bastion_audit_sink::{verify_chain, SqliteAuditSink, SqliteSinkConfig};
use bastion_audit_types::{AuditAction, AuditEvent, AuditFilter, AuditMetadata, AuditTarget};
use bastion_rbac::Role;
use bastion_test_utils::{collect, fast_capture_config, subject, AuditStack};
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submitters_all_land() {
    let stack = AuditStack::memory();

    let mut workers = Vec::new();
    for worker in 0..8 {
        let handle = stack.handle.clone();
        workers.push(tokio::spawn(async move {
            for i in 0..25 {
                let target = AuditTarget::new("resource", format!("w{}-{}", worker, i));
                let event = AuditEvent::builder(AuditAction::Update, target).build();
                assert!(handle.submit(event).is_some());
                tokio::task::yield_now().await;
            }
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }

    let (sink, health) = stack.shutdown().await;
    assert_eq!(health.state, WriterState::Stopped);
    assert_eq!(health.written, 200);
    assert_eq!(health.dropped.total(), 0);

    let records = collect(sink.as_ref(), AuditFilter::new()).await;
    let ids: HashSet<_> = records.iter().map(|r| r.id).collect();
    assert_eq!(ids.len(), 200);
    assert!(records
        .windows(2)
        .all(|w| w[0].sequence < w[1].sequence && w[0].recorded_at < w[1].recorded_at));
    assert_eq!(verify_chain(sink.as_ref()).await.unwrap(), 200);
}

#[tokio::test]
async fn test_sqlite_backed_pipeline() {
    let sink = Arc::new(
        SqliteAuditSink::open(SqliteSinkConfig::in_memory())
            .await
            .unwrap(),
    );
    let (handle, task) = AuditWriter::spawn(sink.clone(), fast_capture_config());
    let auditor = ActionAuditor::new(handle);

    auditor.role_changed(
        &subject("user-a"),
        Role::Member,
        Role::Operator,
        &subject("user-b"),
    );
    auditor.resource_deleted(
        AuditTarget::new("resource", "r-1"),
        &subject("user-b"),
        AuditMetadata::new().with("name", "quarterly report"),
    );

    let health = task.shutdown().await;
    assert_eq!(health.written, 2);
    assert!(health.last_failure.is_none());

    let by_b = collect(sink.as_ref(), AuditFilter::new().actor(subject("user-b"))).await;
    assert_eq!(by_b.len(), 2);
    assert_eq!(by_b[0].action, AuditAction::RoleChange);
    assert_eq!(by_b[1].action, AuditAction::Delete);

    let about_a = collect(sink.as_ref(), AuditFilter::new().entity("user", "user-a")).await;
    assert_eq!(about_a.len(), 1);
    assert_eq!(
        about_a[0].metadata.get("to"),
        Some(&serde_json::json!("operator"))
    );

    assert_eq!(verify_chain(sink.as_ref()).await.unwrap(), 2);
    sink.close().await;
}
