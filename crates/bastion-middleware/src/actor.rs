//! Publishing the resolved principal to outer layers.

use axum::http::Request;
use bastion_rbac::Principal;
use std::sync::{Arc, OnceLock};

/// Write-once slot the request observer reads the resolved actor from.
///
/// The observer runs before authentication, so it cannot see the
/// principal directly. It inserts an empty slot into the request and inner
/// layers fill it in.
#[derive(Debug, Clone, Default)]
pub struct ActorSlot(Arc<OnceLock<Principal>>);

impl ActorSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the principal. Only the first call has an effect.
    pub fn publish(&self, principal: &Principal) {
        let _ = self.0.set(principal.clone());
    }

    /// The published principal, if any.
    pub fn get(&self) -> Option<&Principal> {
        self.0.get()
    }
}

/// Attach a resolved principal to a request.
///
/// Identity layers call this after verifying the caller. The principal is
/// stored in the request extensions and published to the [`ActorSlot`] if
/// one is present.
pub fn attach_principal<B>(req: &mut Request<B>, principal: Principal) {
    if let Some(slot) = req.extensions().get::<ActorSlot>() {
        slot.publish(&principal);
    }
    req.extensions_mut().insert(principal);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_common_core::SubjectId;
    use bastion_rbac::Role;

    fn principal(s: &str, role: Role) -> Principal {
        Principal::new(SubjectId::parse(s).unwrap(), role)
    }

    #[test]
    fn test_first_publish_wins() {
        let slot = ActorSlot::new();
        assert!(slot.get().is_none());
        slot.publish(&principal("a", Role::Member));
        slot.publish(&principal("b", Role::Operator));
        assert_eq!(slot.get().unwrap().subject.as_str(), "a");
    }

    #[test]
    fn test_attach_principal_publishes_to_slot() {
        let slot = ActorSlot::new();
        let mut req = Request::new(());
        req.extensions_mut().insert(slot.clone());

        attach_principal(&mut req, principal("u-1", Role::Member));

        assert_eq!(slot.get().unwrap().subject.as_str(), "u-1");
        assert!(req.extensions().get::<Principal>().is_some());
    }

    #[test]
    fn test_attach_without_slot() {
        let mut req = Request::new(());
        attach_principal(&mut req, principal("u-1", Role::Guest));
        assert!(req.extensions().get::<Principal>().is_some());
    }
}
