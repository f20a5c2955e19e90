//! HTTP front: routing, correlation, authentication extraction
//!
//! A hand-rolled http1 router over path segments. Every response passes
//! through the correlation stamp; every `/api/v1` route authenticates
//! the bearer before dispatch; upload routes pass rate-limit admission
//! first.

pub mod api;
pub mod body;
pub mod correlation;
pub mod dto;
pub mod error;
pub mod health;
pub mod oauth;
pub mod rate_limit;

use std::net::SocketAddr;

use hyper::body::Incoming;
use hyper::header::AUTHORIZATION;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use serde_json::json;
use tracing::{debug, Instrument};

use wexhub_core::domain::errors::{DomainError, OAuthErrorCode};
use wexhub_core::domain::scope::Principal;

pub use crate::state::AppState;

use body::HttpBody;
use error::{api_error, json_response};

/// Resolves the audit client IP for a request
pub fn client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());
    let remote = remote.map(|addr| addr.ip().to_string());
    wexhub_audit::client_ip(forwarded, remote.as_deref())
}

/// Authenticates the bearer credential on a request
pub async fn bearer_principal(
    state: &AppState,
    headers: &HeaderMap,
    client_ip: Option<&str>,
) -> Result<Principal, DomainError> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            DomainError::oauth(OAuthErrorCode::InvalidRequest, "Missing bearer credential")
        })?;
    state.authenticator.authenticate(bearer, client_ip).await
}

/// Top-level request entry point
///
/// Routes, dispatches, and stamps the correlation headers on whatever
/// comes back.
pub async fn handle(
    state: &AppState,
    request: Request<Incoming>,
    remote: Option<SocketAddr>,
) -> Response<HttpBody> {
    let correlation = correlation::correlation_id(request.headers());
    let span = tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        correlation_id = %correlation
    );

    let ip = client_ip(request.headers(), remote);
    async {
        let mut response = route(state, request, ip.as_deref()).await;
        correlation::stamp(response.headers_mut(), &correlation);
        debug!(status = %response.status(), "Request handled");
        response
    }
    .instrument(span)
    .await
}

async fn route(
    state: &AppState,
    request: Request<Incoming>,
    client_ip: Option<&str>,
) -> Response<HttpBody> {
    let method = request.method().clone();
    let path = request.uri().path().trim_matches('/').to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (&method, segments.as_slice()) {
        (&Method::GET, ["healthz"]) => health::healthz(state).await,

        (&Method::GET | &Method::POST, ["oauth", "authorize"]) => {
            oauth::authorize(state, request, client_ip).await
        }
        (&Method::POST, ["oauth", "token"]) => oauth::token(state, request, client_ip).await,
        (&Method::POST, ["oauth", "revoke"]) => oauth::revoke(state, request).await,

        (_, ["api", "v1", rest @ ..]) => {
            let rest = rest.iter().map(|s| s.to_string()).collect::<Vec<_>>();
            api::route(state, request, &method, &rest, client_ip).await
        }

        _ => json_response(
            StatusCode::NOT_FOUND,
            json!({"error": "not_found", "message": "No such route"}),
        ),
    }
}

/// Shorthand used by handlers returning domain results
pub fn respond(result: Result<Response<HttpBody>, DomainError>) -> Response<HttpBody> {
    result.unwrap_or_else(api_error)
}
