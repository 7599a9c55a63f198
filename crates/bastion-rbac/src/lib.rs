//! Role-based access control for Bastion.
//!
//! Roles and permissions are closed enumerations and the mapping between
//! them is fixed at build time. The [`AccessDecisionEngine`] answers a single
//! question, "may this role exercise this permission?", without I/O and
//! without caching, so a role change is visible on the very next check.

mod engine;
mod map;
mod permission;
mod principal;
mod role;

pub use engine::{AccessDecision, AccessDecisionEngine};
pub use map::RolePermissionMap;
pub use permission::Permission;
pub use principal::Principal;
pub use role::{Role, RoleClaim};
