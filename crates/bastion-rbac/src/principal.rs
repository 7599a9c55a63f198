//! Resolved request identity.

use crate::role::{Role, RoleClaim};
use bastion_common_core::SubjectId;
use serde::{Deserialize, Serialize};

/// An authenticated identity plus its current role claim.
///
/// Produced by the external identity layer and treated as read-only input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Opaque subject identifier.
    pub subject: SubjectId,
    /// Role claim at the time of the request.
    pub role: RoleClaim,
}

impl Principal {
    /// Create a principal holding a known role.
    pub fn new(subject: SubjectId, role: Role) -> Self {
        Self {
            subject,
            role: RoleClaim::Known(role),
        }
    }

    /// Create a principal from a raw role claim.
    pub fn from_claim(subject: SubjectId, raw_role: &str) -> Self {
        Self {
            subject,
            role: RoleClaim::parse(raw_role),
        }
    }
}
