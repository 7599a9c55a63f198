//! Business-level audit calls.

use crate::AuditHandle;
use bastion_audit_types::{AuditAction, AuditEvent, AuditMetadata, AuditTarget};
use bastion_common_core::{AuditRecordId, SubjectId};
use bastion_rbac::Role;
use serde::Serialize;
use std::future::Future;
use std::net::IpAddr;

/// Records business events after the change they describe has committed.
///
/// Every method is fire-and-forget: it queues the event and returns. An
/// audit failure never fails the operation that triggered it.
#[derive(Clone)]
pub struct ActionAuditor {
    handle: AuditHandle,
    origin: Option<IpAddr>,
    client: Option<String>,
}

impl ActionAuditor {
    /// Create an auditor writing through `handle`.
    pub fn new(handle: AuditHandle) -> Self {
        Self {
            handle,
            origin: None,
            client: None,
        }
    }

    /// A copy that stamps every record with the caller's origin and client.
    pub fn with_origin(&self, origin: Option<IpAddr>, client: Option<String>) -> Self {
        Self {
            handle: self.handle.clone(),
            origin,
            client,
        }
    }

    /// The underlying handle.
    pub fn handle(&self) -> &AuditHandle {
        &self.handle
    }

    /// Record an event about `target`.
    pub fn record(
        &self,
        target: AuditTarget,
        action: AuditAction,
        actor: Option<&SubjectId>,
        metadata: AuditMetadata,
    ) -> Option<AuditRecordId> {
        let event = AuditEvent::builder(action, target)
            .actor(actor.cloned())
            .metadata_map(metadata)
            .origin(self.origin)
            .client(self.client.clone())
            .build();
        self.handle.submit(event)
    }

    /// A principal's role was changed by `by`.
    pub fn role_changed(
        &self,
        subject: &SubjectId,
        from: Role,
        to: Role,
        by: &SubjectId,
    ) -> Option<AuditRecordId> {
        self.record(
            AuditTarget::new("user", subject.as_str()),
            AuditAction::RoleChange,
            Some(by),
            AuditMetadata::new().with("from", from).with("to", to),
        )
    }

    /// A resource was created.
    pub fn resource_created(
        &self,
        target: AuditTarget,
        by: &SubjectId,
        metadata: AuditMetadata,
    ) -> Option<AuditRecordId> {
        self.record(target, AuditAction::Create, Some(by), metadata)
    }

    /// A resource was updated; `before` and `after` describe the change.
    pub fn resource_updated(
        &self,
        target: AuditTarget,
        by: &SubjectId,
        before: impl Serialize,
        after: impl Serialize,
    ) -> Option<AuditRecordId> {
        self.record(
            target,
            AuditAction::Update,
            Some(by),
            AuditMetadata::new().with("before", before).with("after", after),
        )
    }

    /// A resource was deleted.
    pub fn resource_deleted(
        &self,
        target: AuditTarget,
        by: &SubjectId,
        metadata: AuditMetadata,
    ) -> Option<AuditRecordId> {
        self.record(target, AuditAction::Delete, Some(by), metadata)
    }

    /// A configuration key changed.
    pub fn config_changed(
        &self,
        key: &str,
        by: &SubjectId,
        from: impl Serialize,
        to: impl Serialize,
    ) -> Option<AuditRecordId> {
        self.record(
            AuditTarget::new("config", key),
            AuditAction::ConfigChange,
            Some(by),
            AuditMetadata::new().with("from", from).with("to", to),
        )
    }

    /// Run `mutation` and record `describe(&value)` only if it returns `Ok`.
    ///
    /// The event is queued in the same poll that observes the commit, so a
    /// caller cancelled after the commit cannot lose it. Failed mutations
    /// produce no record.
    pub async fn after_commit<T, E, F, D>(&self, mutation: F, describe: D) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        D: FnOnce(&T) -> AuditEvent,
    {
        let value = mutation.await?;
        let mut event = describe(&value);
        if event.origin.is_none() {
            event.origin = self.origin;
        }
        if event.client.is_none() {
            event.client = self.client.clone();
        }
        self.handle.submit(event);
        Ok(value)
    }
}
