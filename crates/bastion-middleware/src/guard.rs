//! The access guard.

use crate::context::RequestContext;
use crate::error::AccessDenied;
use bastion_audit_capture::AuditHandle;
use bastion_audit_types::{AuditAction, AuditEvent, AuditTarget};
use bastion_rbac::{AccessDecisionEngine, Permission, Principal};
use std::sync::Arc;
use tracing::info;

/// Request-facing permission check.
///
/// A denial queues exactly one `access-denied` audit record and returns
/// [`AccessDenied`]; success records nothing.
#[derive(Clone)]
pub struct AccessGuard {
    engine: Arc<AccessDecisionEngine>,
    audit: AuditHandle,
}

impl AccessGuard {
    /// Create a guard.
    pub fn new(engine: Arc<AccessDecisionEngine>, audit: AuditHandle) -> Self {
        Self { engine, audit }
    }

    /// Check `required` for the request's principal against `target`.
    pub fn authorize(
        &self,
        ctx: &RequestContext,
        required: Permission,
        target: &AuditTarget,
    ) -> Result<(), AccessDenied> {
        self.check(ctx.principal.as_ref(), required, target, Some(ctx))
    }

    /// Check `required` for a principal outside of a request.
    pub fn authorize_principal(
        &self,
        principal: Option<&Principal>,
        required: Permission,
        target: &AuditTarget,
    ) -> Result<(), AccessDenied> {
        self.check(principal, required, target, None)
    }

    /// The engine this guard consults.
    pub fn engine(&self) -> &AccessDecisionEngine {
        &self.engine
    }

    fn check(
        &self,
        principal: Option<&Principal>,
        required: Permission,
        target: &AuditTarget,
        ctx: Option<&RequestContext>,
    ) -> Result<(), AccessDenied> {
        let decision = self.engine.evaluate_principal(principal, required);
        if decision.allowed {
            return Ok(());
        }

        let role = principal.map(|p| p.role.to_string());
        let mut event = AuditEvent::builder(AuditAction::AccessDenied, target.clone())
            .actor(principal.map(|p| p.subject.clone()))
            .metadata("permission", decision.permission)
            .metadata("role", &role);
        if let Some(ctx) = ctx {
            event = event
                .metadata("method", &ctx.method)
                .metadata("path", &ctx.path)
                .metadata("request_id", &ctx.request_id)
                .origin(ctx.origin)
                .client(ctx.client.clone());
        }
        let record_id = self.audit.submit(event.build());

        info!(
            event = "access_denied",
            permission = %decision.permission,
            role = role.as_deref().unwrap_or("anonymous"),
            actor = principal.map(|p| p.subject.as_str()).unwrap_or("anonymous"),
            entity_type = %target.entity_type,
            entity_id = %target.entity_id,
            record_id = ?record_id,
            "Access denied"
        );
        Err(AccessDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_audit_types::AuditFilter;
    use bastion_rbac::Role;
    use bastion_test_utils::{collect, principal, subject, AuditStack};

    fn guard(stack: &AuditStack) -> AccessGuard {
        AccessGuard::new(Arc::new(AccessDecisionEngine::standard()), stack.handle.clone())
    }

    #[tokio::test]
    async fn test_success_records_nothing() {
        let stack = AuditStack::memory();
        let guard = guard(&stack);
        let admin = principal("root", Role::Administrator);

        let target = AuditTarget::new("config", "audit.batch_size");
        assert!(guard
            .authorize_principal(Some(&admin), Permission::ConfigWrite, &target)
            .is_ok());

        let (sink, health) = stack.shutdown().await;
        assert_eq!(health.submitted, 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_denial_records_once() {
        let stack = AuditStack::memory();
        let guard = guard(&stack);
        let member = principal("u-1", Role::Member);
        let target = AuditTarget::new("resource", "r-1");

        assert_eq!(
            guard.authorize_principal(Some(&member), Permission::ResourceDelete, &target),
            Err(AccessDenied)
        );

        let records = stack.wait_for(AuditFilter::new(), 1).await;
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.action, AuditAction::AccessDenied);
        assert_eq!(record.target, target);
        assert_eq!(record.actor, Some(member.subject.clone()));
        assert_eq!(
            record.metadata.get("permission"),
            Some(&serde_json::json!("resource:delete"))
        );
        assert_eq!(record.metadata.get("role"), Some(&serde_json::json!("member")));
    }

    #[tokio::test]
    async fn test_anonymous_denial_has_no_actor() {
        let stack = AuditStack::memory();
        let guard = guard(&stack);
        let target = AuditTarget::new("resource", "r-1");

        assert!(guard
            .authorize_principal(None, Permission::ResourceRead, &target)
            .is_ok());
        assert!(guard
            .authorize_principal(None, Permission::ResourceCreate, &target)
            .is_err());

        let records = stack.wait_for(AuditFilter::new(), 1).await;
        assert_eq!(records[0].actor, None);
        assert_eq!(records[0].metadata.get("role"), Some(&serde_json::Value::Null));
    }

    #[tokio::test]
    async fn test_denials_match_decisions_for_every_caller() {
        let stack = AuditStack::memory();
        let guard = guard(&stack);
        let engine = guard.engine().clone();
        let target = AuditTarget::new("resource", "r-1");

        let mut callers: Vec<Option<Principal>> = Role::all()
            .map(|role| Some(principal(&format!("as-{role}"), role)))
            .collect();
        callers.push(Some(Principal::from_claim(subject("odd"), "superuser")));
        callers.push(None);

        let mut denied = 0u64;
        for caller in &callers {
            for permission in Permission::all() {
                if guard
                    .authorize_principal(caller.as_ref(), permission, &target)
                    .is_err()
                {
                    denied += 1;
                }
            }
        }

        let (sink, health) = stack.shutdown().await;
        assert_eq!(health.submitted, denied);
        assert_eq!(health.dropped.total(), 0);
        let records = collect(sink.as_ref(), AuditFilter::new()).await;
        assert_eq!(records.len() as u64, denied);
        assert!(records.iter().all(|r| r.action == AuditAction::AccessDenied));

        let count_for = |actor: Option<&str>| {
            records
                .iter()
                .filter(|r| r.actor.as_ref().map(|a| a.as_str()) == actor)
                .count()
        };
        for role in Role::all() {
            let expected = Permission::all()
                .filter(|p| !engine.decide_role(role, *p))
                .count();
            assert_eq!(count_for(Some(format!("as-{role}").as_str())), expected, "{role}");
        }
        assert_eq!(count_for(Some("as-administrator")), 0);
        assert_eq!(count_for(Some("odd")), Permission::all().count());
        let guest_denials = Permission::all()
            .filter(|p| !engine.decide_role(Role::Guest, *p))
            .count();
        assert_eq!(count_for(None), guest_denials);
    }
}
