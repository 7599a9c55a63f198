//! Audit query filters.

use crate::{AuditAction, AuditRecord};
use bastion_common_core::SubjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Criteria for reading audit records. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Entity type.
    pub entity_type: Option<String>,
    /// Entity id.
    pub entity_id: Option<String>,
    /// Acting subject.
    pub actor: Option<SubjectId>,
    /// Action kind.
    pub action: Option<AuditAction>,
    /// Inclusive lower time bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper time bound.
    pub to: Option<DateTime<Utc>>,
    /// Only records with a sequence greater than this (resume point).
    pub after: Option<u64>,
}

impl AuditFilter {
    /// Match everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one entity.
    pub fn entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Restrict to an entity type.
    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Restrict to an actor.
    pub fn actor(mut self, actor: SubjectId) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Restrict to an action kind.
    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Restrict to `[from, to)`.
    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Resume after a previously seen sequence number.
    pub fn after(mut self, sequence: u64) -> Self {
        self.after = Some(sequence);
        self
    }

    /// Whether `record` satisfies every set criterion.
    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.entity_type
            .as_ref()
            .map_or(true, |t| *t == record.target.entity_type)
            && self
                .entity_id
                .as_ref()
                .map_or(true, |id| *id == record.target.entity_id)
            && self
                .actor
                .as_ref()
                .map_or(true, |a| record.actor.as_ref() == Some(a))
            && self.action.map_or(true, |a| a == record.action)
            && self.from.map_or(true, |from| record.recorded_at >= from)
            && self.to.map_or(true, |to| record.recorded_at < to)
            && self.after.map_or(true, |after| record.sequence > after)
    }
}
