//! HTTP middleware for Bastion.
//!
//! Layering, outermost first:
//!
//! 1. [`RequestObserverLayer`] records one `http-request` audit record per
//!    call, whatever happens inside.
//! 2. The upstream identity layer resolves the caller and calls
//!    [`attach_principal`].
//! 3. [`RequirePermissionLayer`] or an explicit [`AccessGuard::authorize`]
//!    call in the handler checks the permission and records denials.
//! 4. Handlers record business events with an
//!    [`ActionAuditor`](bastion_audit_capture::ActionAuditor).

mod actor;
mod context;
mod error;
mod guard;
mod layer;
mod observer;

pub use actor::{attach_principal, ActorSlot};
pub use context::{RequestContext, RequestId};
pub use error::AccessDenied;
pub use guard::AccessGuard;
pub use layer::{RequirePermission, RequirePermissionLayer};
pub use observer::{RequestObserver, RequestObserverLayer};
