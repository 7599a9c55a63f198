//! The fixed role → permission mapping.

use crate::permission::Permission;
use crate::role::Role;
use std::collections::{HashMap, HashSet};

/// Grants for each role, decided at build time.
///
/// The match is exhaustive so a new role cannot be added without deciding
/// what it may do. The wildcard role lists nothing; the engine checks it first.
const fn grants(role: Role) -> &'static [Permission] {
    use Permission::*;
    match role {
        Role::Guest => &[ResourceRead],
        Role::Member => &[ResourceRead, ResourceCreate, ResourceUpdate, UserRead],
        Role::Operator => &[
            ResourceRead,
            ResourceCreate,
            ResourceUpdate,
            ResourceDelete,
            UserRead,
            AuditRead,
            ConfigRead,
        ],
        Role::Administrator => &[],
    }
}

/// Total mapping from every [`Role`] to its permission set.
///
/// Built once at startup and never mutated; there is no write path.
#[derive(Debug, Clone)]
pub struct RolePermissionMap {
    wildcard: Role,
    roles: HashMap<Role, HashSet<Permission>>,
}

impl RolePermissionMap {
    /// The platform's standard mapping.
    pub fn standard() -> Self {
        Self::from_grants(
            Role::WILDCARD,
            Role::all().map(|role| (role, grants(role).iter().copied().collect())),
        )
    }

    /// Build a mapping; roles missing from `entries` get the empty set.
    pub(crate) fn from_grants(
        wildcard: Role,
        entries: impl IntoIterator<Item = (Role, HashSet<Permission>)>,
    ) -> Self {
        let mut roles: HashMap<Role, HashSet<Permission>> = entries.into_iter().collect();
        for role in Role::all() {
            roles.entry(role).or_default();
        }
        Self { wildcard, roles }
    }

    /// The role that implicitly holds every permission.
    pub fn wildcard(&self) -> Role {
        self.wildcard
    }

    /// Explicit grants for a role (the wildcard role's set is empty).
    pub fn permissions(&self, role: Role) -> &HashSet<Permission> {
        // from_grants fills every role, so the index cannot miss
        &self.roles[&role]
    }

    /// Whether `role` explicitly lists `permission`.
    pub fn grants(&self, role: Role, permission: Permission) -> bool {
        self.roles
            .get(&role)
            .map(|set| set.contains(&permission))
            .unwrap_or(false)
    }
}

impl Default for RolePermissionMap {
    fn default() -> Self {
        Self::standard()
    }
}
