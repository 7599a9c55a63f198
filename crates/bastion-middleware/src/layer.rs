//! Route-level permission layer.

use crate::context::RequestContext;
use crate::guard::AccessGuard;
use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use bastion_audit_types::AuditTarget;
use bastion_rbac::Permission;
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Require a permission for every request routed through this layer.
///
/// Denials are answered with a generic 403 and recorded against the
/// request path; allowed requests reach the inner service untouched.
#[derive(Clone)]
pub struct RequirePermissionLayer {
    guard: AccessGuard,
    permission: Permission,
}

impl RequirePermissionLayer {
    pub fn new(guard: AccessGuard, permission: Permission) -> Self {
        Self { guard, permission }
    }
}

impl<S> Layer<S> for RequirePermissionLayer {
    type Service = RequirePermission<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequirePermission {
            inner,
            guard: self.guard.clone(),
            permission: self.permission,
        }
    }
}

#[derive(Clone)]
pub struct RequirePermission<S> {
    inner: S,
    guard: AccessGuard,
    permission: Permission,
}

impl<S> Service<Request<Body>> for RequirePermission<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let ctx = RequestContext::from_request(&req);
        let target = AuditTarget::route(ctx.path.clone());

        if let Err(denied) = self.guard.authorize(&ctx, self.permission, &target) {
            return Box::pin(async move { Ok::<_, S::Error>(denied.into_response()) });
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}

