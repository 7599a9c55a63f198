//! Explicit per-request context.

use crate::actor::ActorSlot;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, Extensions, HeaderMap, Method, Request, Uri},
};
use bastion_audit_capture::ActionAuditor;
use bastion_common_core::SubjectId;
use bastion_rbac::Principal;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

/// Request id shared by every layer that handles one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// What the core needs to know about the current request.
///
/// Passed explicitly to the guard and auditors; nothing is looked up from
/// ambient state.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Resolved caller, `None` for anonymous requests.
    pub principal: Option<Principal>,
    /// Caller network address.
    pub origin: Option<IpAddr>,
    /// Client descriptor (user agent).
    pub client: Option<String>,
    pub method: String,
    pub path: String,
    pub request_id: String,
}

impl RequestContext {
    /// Build from request parts.
    pub fn from_parts(parts: &Parts) -> Self {
        Self::build(&parts.method, &parts.uri, &parts.headers, &parts.extensions)
    }

    /// Build from a full request.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        Self::build(req.method(), req.uri(), req.headers(), req.extensions())
    }

    fn build(method: &Method, uri: &Uri, headers: &HeaderMap, extensions: &Extensions) -> Self {
        let principal = extensions.get::<Principal>().cloned();
        if let (Some(principal), Some(slot)) = (&principal, extensions.get::<ActorSlot>()) {
            slot.publish(principal);
        }

        Self {
            principal,
            origin: client_origin(headers, extensions),
            client: user_agent(headers),
            method: method.to_string(),
            path: uri.path().to_string(),
            request_id: request_id(headers, extensions),
        }
    }

    /// Subject of the resolved caller.
    pub fn actor(&self) -> Option<&SubjectId> {
        self.principal.as_ref().map(|p| &p.subject)
    }

    /// An auditor that stamps records with this request's origin.
    pub fn auditor(&self, auditor: &ActionAuditor) -> ActionAuditor {
        auditor.with_origin(self.origin, self.client.clone())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// Caller address: first `x-forwarded-for` hop, then `x-real-ip`, then the
/// socket peer.
pub(crate) fn client_origin(headers: &HeaderMap, extensions: &Extensions) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        })
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
}

pub(crate) fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

pub(crate) fn request_id(headers: &HeaderMap, extensions: &Extensions) -> String {
    extensions
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .or_else(|| {
            headers
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        })
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_rbac::Role;

    fn parts(build: impl FnOnce(axum::http::request::Builder) -> axum::http::request::Builder) -> Parts {
        let req = build(Request::builder().uri("/resources/r-1?x=1").method("DELETE"))
            .body(())
            .unwrap();
        req.into_parts().0
    }

    #[tokio::test]
    async fn test_extracts_request_details() {
        let mut parts = parts(|b| {
            b.header("x-forwarded-for", "198.51.100.7, 10.0.0.1")
                .header("user-agent", "curl/8.0")
                .header("x-request-id", "req-42")
        });
        let principal = Principal::new(SubjectId::parse("u-1").unwrap(), Role::Member);
        parts.extensions.insert(principal.clone());

        let ctx = RequestContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.principal, Some(principal));
        assert_eq!(ctx.origin, Some("198.51.100.7".parse().unwrap()));
        assert_eq!(ctx.client.as_deref(), Some("curl/8.0"));
        assert_eq!(ctx.method, "DELETE");
        assert_eq!(ctx.path, "/resources/r-1");
        assert_eq!(ctx.request_id, "req-42");
        assert_eq!(ctx.actor().map(|s| s.as_str()), Some("u-1"));
    }

    #[test]
    fn test_origin_precedence() {
        let real_ip = parts(|b| b.header("x-real-ip", "192.0.2.1"));
        assert_eq!(
            client_origin(&real_ip.headers, &real_ip.extensions),
            Some("192.0.2.1".parse().unwrap())
        );

        let mut peer = parts(|b| b);
        peer.extensions
            .insert(ConnectInfo("203.0.113.9:4000".parse::<SocketAddr>().unwrap()));
        assert_eq!(
            client_origin(&peer.headers, &peer.extensions),
            Some("203.0.113.9".parse().unwrap())
        );

        let garbage = parts(|b| b.header("x-forwarded-for", "not-an-ip"));
        assert_eq!(client_origin(&garbage.headers, &garbage.extensions), None);
    }

    #[test]
    fn test_request_id_prefers_extension() {
        let mut p = parts(|b| b.header("x-request-id", "from-header"));
        p.extensions.insert(RequestId("from-observer".into()));
        assert_eq!(request_id(&p.headers, &p.extensions), "from-observer");

        let fresh = parts(|b| b);
        assert!(Uuid::parse_str(&request_id(&fresh.headers, &fresh.extensions)).is_ok());
    }

    #[test]
    fn test_context_publishes_to_slot() {
        let mut p = parts(|b| b);
        let slot = ActorSlot::new();
        p.extensions.insert(slot.clone());
        p.extensions
            .insert(Principal::new(SubjectId::parse("u-9").unwrap(), Role::Operator));

        RequestContext::from_parts(&p);
        assert_eq!(slot.get().unwrap().subject.as_str(), "u-9");
    }
}
