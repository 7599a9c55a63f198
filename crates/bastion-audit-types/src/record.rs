//! Stored audit records and their integrity seal.

use crate::{AuditAction, AuditEvent, AuditMetadata, AuditTarget};
use bastion_common_core::{AuditRecordId, SubjectId};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::net::IpAddr;

/// Previous-hash value of the first record in a store.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Hash link binding a record to its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSeal {
    /// Hash of the preceding record.
    pub prev_hash: String,
    /// Hash of this record.
    pub hash: String,
    /// Digest of the actor as first written, `None` for records without one.
    ///
    /// Covered by `hash`, so the actor can be detached but never replaced.
    #[serde(default)]
    pub actor_digest: Option<String>,
}

/// An audit record as stored by a sink. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record id.
    pub id: AuditRecordId,
    /// Store-assigned position, strictly increasing.
    pub sequence: u64,
    /// Sink-assigned write time, strictly monotonic per sink.
    pub recorded_at: DateTime<Utc>,
    /// What the record is about.
    pub target: AuditTarget,
    /// What happened.
    pub action: AuditAction,
    /// Who did it; `None` when unknown or after the actor was removed.
    pub actor: Option<SubjectId>,
    /// Contextual detail.
    pub metadata: AuditMetadata,
    /// Caller network address.
    pub origin: Option<IpAddr>,
    /// Client descriptor.
    pub client: Option<String>,
    /// Integrity seal.
    pub seal: RecordSeal,
}

impl AuditRecord {
    /// Turn an event into a sealed record.
    ///
    /// `event.id` must already be assigned; a missing id gets a fresh one.
    pub fn seal(
        mut event: AuditEvent,
        sequence: u64,
        recorded_at: DateTime<Utc>,
        prev_hash: &str,
    ) -> Self {
        let id = event.ensure_id();
        let actor_digest = event.actor.as_ref().map(actor_digest);
        let mut record = Self {
            id,
            sequence,
            recorded_at,
            target: event.target,
            action: event.action,
            actor: event.actor,
            metadata: event.metadata,
            origin: event.origin,
            client: event.client,
            seal: RecordSeal {
                prev_hash: prev_hash.to_string(),
                hash: String::new(),
                actor_digest,
            },
        };
        record.seal.hash = record.compute_hash();
        record
    }

    /// Recompute the hash over the sealed fields.
    ///
    /// The actor itself is not covered so detaching a removed actor keeps the
    /// seal valid; its digest is.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.sequence.to_le_bytes());
        for field in [
            self.id.to_string(),
            self.recorded_at_text(),
            self.target.entity_type.clone(),
            self.target.entity_id.clone(),
            self.action.to_string(),
            self.metadata.to_json_string(),
            self.origin.map(|ip| ip.to_string()).unwrap_or_default(),
            self.client.clone().unwrap_or_default(),
            self.seal.prev_hash.clone(),
            self.seal.actor_digest.clone().unwrap_or_default(),
        ] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Whether the stored hash matches the record's content.
    ///
    /// A present actor must match the sealed digest; an absent one is a
    /// detached actor and is accepted.
    pub fn verify_seal(&self) -> bool {
        let actor_intact = match (&self.actor, &self.seal.actor_digest) {
            (None, _) => true,
            (Some(actor), Some(digest)) => actor_digest(actor) == *digest,
            (Some(_), None) => false,
        };
        actor_intact && self.compute_hash() == self.seal.hash
    }

    /// Timestamp in the fixed text form used for hashing and storage.
    pub fn recorded_at_text(&self) -> String {
        self.recorded_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

fn actor_digest(actor: &SubjectId) -> String {
    format!("{:x}", Sha256::digest(actor.as_str().as_bytes()))
}
