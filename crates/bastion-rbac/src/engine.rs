//! Access decision engine.

use crate::map::RolePermissionMap;
use crate::permission::Permission;
use crate::principal::Principal;
use crate::role::{Role, RoleClaim};

/// Outcome of a single permission check.
///
/// Produced fresh on every call and never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    /// Whether access is allowed.
    pub allowed: bool,
    /// The permission that was evaluated.
    pub permission: Permission,
}

/// Pure permission check over a fixed [`RolePermissionMap`].
///
/// Holds no mutable state, so one instance can be shared by every request.
#[derive(Debug, Clone, Default)]
pub struct AccessDecisionEngine {
    map: RolePermissionMap,
}

impl AccessDecisionEngine {
    /// Create an engine over the given mapping.
    pub fn new(map: RolePermissionMap) -> Self {
        Self { map }
    }

    /// Create an engine over the standard mapping.
    pub fn standard() -> Self {
        Self::new(RolePermissionMap::standard())
    }

    /// Whether `role` may exercise `required`.
    ///
    /// The wildcard role is always allowed. Unrecognized claims hold no
    /// permissions.
    pub fn decide(&self, role: &RoleClaim, required: Permission) -> bool {
        match role {
            RoleClaim::Known(role) => self.decide_role(*role, required),
            RoleClaim::Unrecognized(_) => false,
        }
    }

    /// Same as [`decide`](Self::decide) for a known role.
    pub fn decide_role(&self, role: Role, required: Permission) -> bool {
        role == self.map.wildcard() || self.map.grants(role, required)
    }

    /// Evaluate and return the full decision.
    pub fn evaluate(&self, role: &RoleClaim, required: Permission) -> AccessDecision {
        AccessDecision {
            allowed: self.decide(role, required),
            permission: required,
        }
    }

    /// Evaluate for an optional principal. Anonymous callers are guests.
    pub fn evaluate_principal(
        &self,
        principal: Option<&Principal>,
        required: Permission,
    ) -> AccessDecision {
        match principal {
            Some(principal) => self.evaluate(&principal.role, required),
            None => self.evaluate(&RoleClaim::Known(Role::Guest), required),
        }
    }

    /// The mapping this engine evaluates against.
    pub fn map(&self) -> &RolePermissionMap {
        &self.map
    }
}
