//! Per-request audit observation.

use crate::actor::ActorSlot;
use crate::context::{client_origin, request_id, user_agent, RequestId};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use bastion_audit_capture::AuditHandle;
use bastion_audit_types::{AuditAction, AuditEvent, AuditTarget};
use bastion_rbac::Principal;
use futures::future::BoxFuture;
use std::net::IpAddr;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::debug;

/// Records one `http-request` audit record for every request.
///
/// Install it outermost so requests rejected before authentication, routing
/// misses and cancelled requests are observed too.
#[derive(Clone)]
pub struct RequestObserverLayer {
    audit: AuditHandle,
}

impl RequestObserverLayer {
    pub fn new(audit: AuditHandle) -> Self {
        Self { audit }
    }
}

impl<S> Layer<S> for RequestObserverLayer {
    type Service = RequestObserver<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestObserver {
            inner,
            audit: self.audit.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RequestObserver<S> {
    inner: S,
    audit: AuditHandle,
}

impl<S> Service<Request<Body>> for RequestObserver<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let slot = ActorSlot::new();
        if let Some(principal) = req.extensions().get::<Principal>() {
            slot.publish(principal);
        }
        let id = request_id(req.headers(), req.extensions());

        let mut observation = Observation {
            audit: self.audit.clone(),
            slot: slot.clone(),
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
            origin: client_origin(req.headers(), req.extensions()),
            client: user_agent(req.headers()),
            request_id: id.clone(),
            started: Instant::now(),
            status: None,
            outcome: Outcome::Cancelled,
        };

        req.extensions_mut().insert(slot);
        req.extensions_mut().insert(RequestId(id));

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let result = inner.call(req).await;
            match &result {
                Ok(response) => observation.finish(response.status(), Outcome::Completed),
                Err(_) => observation.finish(StatusCode::INTERNAL_SERVER_ERROR, Outcome::Failed),
            }
            result
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
    Cancelled,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Submits the request record when dropped, so a future abandoned mid-call
/// still produces exactly one record.
struct Observation {
    audit: AuditHandle,
    slot: ActorSlot,
    method: String,
    path: String,
    origin: Option<IpAddr>,
    client: Option<String>,
    request_id: String,
    started: Instant,
    status: Option<StatusCode>,
    outcome: Outcome,
}

impl Observation {
    fn finish(&mut self, status: StatusCode, outcome: Outcome) {
        self.status = Some(status);
        self.outcome = outcome;
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        let status = self.status.map(|s| s.as_u16());
        let actor = self.slot.get().map(|p| p.subject.clone());

        let event = AuditEvent::builder(AuditAction::HttpRequest, AuditTarget::route(self.path.clone()))
            .actor(actor)
            .metadata("method", &self.method)
            .metadata("path", &self.path)
            .metadata("status", status)
            .metadata("duration_ms", duration_ms)
            .metadata("request_id", &self.request_id)
            .metadata("outcome", self.outcome.as_str())
            .origin(self.origin)
            .client(self.client.take())
            .build();
        let record_id = self.audit.submit(event);

        debug!(
            event = "request_observed",
            request_id = %self.request_id,
            method = %self.method,
            path = %self.path,
            status = ?status,
            duration_ms,
            outcome = self.outcome.as_str(),
            record_id = ?record_id,
        );
    }
}
