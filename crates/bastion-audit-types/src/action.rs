//! Audit action taxonomy.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Closed set of actions an audit record can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, Display, EnumIter, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AuditAction {
    // Business mutations
    Create,
    Update,
    Delete,

    // Authorization
    AccessDenied,
    RoleChange,

    // Configuration
    ConfigChange,

    // Traffic
    HttpRequest,
}

impl AuditAction {
    /// Whether this action is the coarse per-request traffic record.
    pub fn is_traffic(&self) -> bool {
        matches!(self, Self::HttpRequest)
    }

    /// Get all actions.
    pub fn all() -> impl Iterator<Item = Self> {
        use strum::IntoEnumIterator;
        Self::iter()
    }
}
