//! Roles and role claims.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Roles a principal can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(AsRefStr, Display, EnumIter, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Role {
    /// Unauthenticated visitor.
    Guest,
    /// Registered account.
    Member,
    /// Staff account that moderates resources.
    Operator,
    /// Highest-privilege role; holds every permission implicitly.
    Administrator,
}

impl Role {
    /// The role granted every permission without enumeration.
    pub const WILDCARD: Role = Role::Administrator;

    /// Get all roles.
    pub fn all() -> impl Iterator<Item = Self> {
        use strum::IntoEnumIterator;
        Self::iter()
    }
}

/// A role claim as delivered by the identity provider.
///
/// Claims that do not name a known [`Role`] are kept verbatim so they can be
/// logged, but they never grant anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RoleClaim {
    /// The claim names a known role.
    Known(Role),
    /// The claim is missing, malformed or names a role this build does not know.
    Unrecognized(String),
}

impl RoleClaim {
    /// Parse a raw claim value. Never fails; unknown values are `Unrecognized`.
    pub fn parse(raw: &str) -> Self {
        match Role::from_str(raw) {
            Ok(role) => Self::Known(role),
            Err(_) => Self::Unrecognized(raw.to_string()),
        }
    }

    /// The known role, if any.
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Known(role) => Some(*role),
            Self::Unrecognized(_) => None,
        }
    }
}

impl From<Role> for RoleClaim {
    fn from(role: Role) -> Self {
        Self::Known(role)
    }
}

impl From<String> for RoleClaim {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<RoleClaim> for String {
    fn from(claim: RoleClaim) -> Self {
        claim.to_string()
    }
}

impl fmt::Display for RoleClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(role) => write!(f, "{}", role),
            Self::Unrecognized(raw) => f.write_str(raw),
        }
    }
}
