//! Controllable capabilities.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumCount, EnumIter, EnumString};

/// A single controllable capability.
///
/// The set is closed: every permission the platform checks is listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(AsRefStr, Display, EnumCount, EnumIter, EnumString)]
pub enum Permission {
    /// View business resources.
    #[serde(rename = "resource:read")]
    #[strum(serialize = "resource:read")]
    ResourceRead,
    /// Create business resources.
    #[serde(rename = "resource:create")]
    #[strum(serialize = "resource:create")]
    ResourceCreate,
    /// Modify existing business resources.
    #[serde(rename = "resource:update")]
    #[strum(serialize = "resource:update")]
    ResourceUpdate,
    /// Remove business resources.
    #[serde(rename = "resource:delete")]
    #[strum(serialize = "resource:delete")]
    ResourceDelete,
    /// View user accounts and their roles.
    #[serde(rename = "user:read")]
    #[strum(serialize = "user:read")]
    UserRead,
    /// Assign a different role to a user.
    #[serde(rename = "user:update-role")]
    #[strum(serialize = "user:update-role")]
    UserUpdateRole,
    /// Remove a user account.
    #[serde(rename = "user:delete")]
    #[strum(serialize = "user:delete")]
    UserDelete,
    /// Query the audit trail.
    #[serde(rename = "audit:read")]
    #[strum(serialize = "audit:read")]
    AuditRead,
    /// View platform configuration.
    #[serde(rename = "config:read")]
    #[strum(serialize = "config:read")]
    ConfigRead,
    /// Change platform configuration.
    #[serde(rename = "config:write")]
    #[strum(serialize = "config:write")]
    ConfigWrite,
}

impl Permission {
    /// Get all permissions.
    pub fn all() -> impl Iterator<Item = Self> {
        use strum::IntoEnumIterator;
        Self::iter()
    }
}
