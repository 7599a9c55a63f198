//! Audit events as described by callers.

use crate::{AuditAction, AuditMetadata};
use bastion_common_core::{AuditRecordId, SubjectId};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// The entity an audit record is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditTarget {
    /// Type of the entity (`user`, `resource`, `route`, ...).
    pub entity_type: String,
    /// Entity identifier.
    pub entity_id: String,
}

impl AuditTarget {
    /// Create a new target.
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    /// Target for a request path.
    pub fn route(path: impl Into<String>) -> Self {
        Self::new("route", path)
    }
}

/// A security-relevant event that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Pre-assigned record id; the sink assigns one when absent.
    pub id: Option<AuditRecordId>,
    /// What the event is about.
    pub target: AuditTarget,
    /// What happened.
    pub action: AuditAction,
    /// Who did it, if known.
    pub actor: Option<SubjectId>,
    /// Contextual detail.
    #[serde(default)]
    pub metadata: AuditMetadata,
    /// Caller network address.
    pub origin: Option<IpAddr>,
    /// Client descriptor (user agent).
    pub client: Option<String>,
}

impl AuditEvent {
    /// Create a new event builder.
    pub fn builder(action: AuditAction, target: AuditTarget) -> AuditEventBuilder {
        AuditEventBuilder::new(action, target)
    }

    /// The record id, assigning a fresh one if none was set.
    pub fn ensure_id(&mut self) -> AuditRecordId {
        *self.id.get_or_insert_with(AuditRecordId::new)
    }
}

/// Builder for [`AuditEvent`].
#[derive(Debug)]
pub struct AuditEventBuilder {
    event: AuditEvent,
}

impl AuditEventBuilder {
    /// Create a new builder.
    pub fn new(action: AuditAction, target: AuditTarget) -> Self {
        Self {
            event: AuditEvent {
                id: None,
                target,
                action,
                actor: None,
                metadata: AuditMetadata::new(),
                origin: None,
                client: None,
            },
        }
    }

    /// Pre-assign the record id.
    pub fn id(mut self, id: AuditRecordId) -> Self {
        self.event.id = Some(id);
        self
    }

    /// Set the actor.
    pub fn actor(mut self, actor: impl Into<Option<SubjectId>>) -> Self {
        self.event.actor = actor.into();
        self
    }

    /// Add one metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.event.metadata.insert(key, value);
        self
    }

    /// Replace all metadata.
    pub fn metadata_map(mut self, metadata: AuditMetadata) -> Self {
        self.event.metadata = metadata;
        self
    }

    /// Set the caller address.
    pub fn origin(mut self, origin: impl Into<Option<IpAddr>>) -> Self {
        self.event.origin = origin.into();
        self
    }

    /// Set the client descriptor.
    pub fn client(mut self, client: Option<impl Into<String>>) -> Self {
        self.event.client = client.map(Into::into);
        self
    }

    /// Build the event.
    pub fn build(self) -> AuditEvent {
        self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let actor = SubjectId::parse("user-b").unwrap();
        let event = AuditEvent::builder(AuditAction::RoleChange, AuditTarget::new("user", "user-a"))
            .actor(actor.clone())
            .metadata("from", "member")
            .metadata("to", "operator")
            .origin("10.0.0.7".parse::<IpAddr>().unwrap())
            .client(Some("curl/8.0"))
            .build();

        assert_eq!(event.actor, Some(actor));
        assert_eq!(event.target.entity_id, "user-a");
        assert_eq!(event.metadata.get("to"), Some(&serde_json::json!("operator")));
        assert_eq!(event.client.as_deref(), Some("curl/8.0"));
        assert!(event.id.is_none());
    }

    #[test]
    fn test_ensure_id_is_stable() {
        let mut event =
            AuditEvent::builder(AuditAction::Delete, AuditTarget::new("resource", "r-1")).build();
        let first = event.ensure_id();
        assert_eq!(event.ensure_id(), first);
    }

    #[test]
    fn test_route_target() {
        let target = AuditTarget::route("/admin/config");
        assert_eq!(target.entity_type, "route");
        assert_eq!(target.entity_id, "/admin/config");
    }
}
