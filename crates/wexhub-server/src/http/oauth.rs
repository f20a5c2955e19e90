//! OAuth endpoint handlers
//!
//! `/oauth/authorize`, `/oauth/token`, `/oauth/revoke`. The 302-vs-400
//! decision for `/authorize` is made by the service; this layer only
//! renders it. `/revoke` always answers 200, per RFC 7009.

use std::collections::HashMap;

use hyper::body::Incoming;
use hyper::header::{HeaderValue, LOCATION};
use hyper::{Request, Response, StatusCode};
use serde_json::json;

use wexhub_auth::oauth::AuthorizeRejection;
use wexhub_auth::{AuthorizeRequest, TokenRequest};
use wexhub_core::domain::errors::{DomainError, OAuthErrorCode};

use super::body::{empty, full, read_limited, HttpBody};
use super::error::{json_response, oauth_error};
use super::AppState;

/// Largest accepted form body on the OAuth endpoints
const MAX_FORM_BYTES: usize = 16 * 1024;

fn query_map(query: Option<&str>) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .into_owned()
        .collect()
}

async fn form_map(body: Incoming) -> Result<HashMap<String, String>, Response<HttpBody>> {
    let bytes = read_limited(body, MAX_FORM_BYTES).await.map_err(|_| {
        json_response(
            StatusCode::BAD_REQUEST,
            json!({"error": "invalid_request", "error_description": "Malformed request body"}),
        )
    })?;
    Ok(url::form_urlencoded::parse(&bytes).into_owned().collect())
}

/// `GET|POST /oauth/authorize`
pub async fn authorize(
    state: &AppState,
    request: Request<Incoming>,
    client_ip: Option<&str>,
) -> Response<HttpBody> {
    // The resource owner must already be authenticated; browser-session
    // callers arrive with their session bearer
    let principal = match super::bearer_principal(state, request.headers(), client_ip).await {
        Ok(principal) => principal,
        Err(err) => return oauth_error(err),
    };

    let params = query_map(request.uri().query());
    let authorize_request = AuthorizeRequest {
        response_type: params.get("response_type").cloned(),
        client_id: params.get("client_id").cloned(),
        redirect_uri: params.get("redirect_uri").cloned(),
        scope: params.get("scope").cloned(),
        state: params.get("state").cloned(),
        code_challenge: params.get("code_challenge").cloned(),
        code_challenge_method: params.get("code_challenge_method").cloned(),
    };

    match state.oauth.authorize(principal.user_id, authorize_request).await {
        Ok(location) => redirect(&location),
        Err(AuthorizeRejection::Redirect { location }) => redirect(&location),
        Err(AuthorizeRejection::BadRequest { code, description }) => json_response(
            StatusCode::BAD_REQUEST,
            json!({"error": code.as_str(), "error_description": description}),
        ),
    }
}

/// `POST /oauth/token`
pub async fn token(
    state: &AppState,
    request: Request<Incoming>,
    client_ip: Option<&str>,
) -> Response<HttpBody> {
    let form = match form_map(request.into_body()).await {
        Ok(form) => form,
        Err(response) => return response,
    };
    let token_request = TokenRequest {
        grant_type: form.get("grant_type").cloned(),
        client_id: form.get("client_id").cloned(),
        client_secret: form.get("client_secret").cloned(),
        code: form.get("code").cloned(),
        redirect_uri: form.get("redirect_uri").cloned(),
        code_verifier: form.get("code_verifier").cloned(),
        refresh_token: form.get("refresh_token").cloned(),
    };

    match state.oauth.token(token_request, client_ip).await {
        Ok(grant) => match serde_json::to_string(&grant) {
            Ok(body) => {
                let mut response = Response::new(full(body));
                response.headers_mut().insert(
                    hyper::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                response
            }
            Err(e) => oauth_error(DomainError::Transient(e.to_string())),
        },
        Err(err) => oauth_error(err),
    }
}

/// `POST /oauth/revoke`; always 200
pub async fn revoke(state: &AppState, request: Request<Incoming>) -> Response<HttpBody> {
    if let Ok(form) = form_map(request.into_body()).await {
        if let Some(token) = form.get("token") {
            state.oauth.revoke(token).await;
        }
    }
    Response::new(empty())
}

fn redirect(location: &str) -> Response<HttpBody> {
    let mut response = Response::new(empty());
    *response.status_mut() = StatusCode::FOUND;
    match HeaderValue::from_str(location) {
        Ok(value) => {
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(_) => json_response(
            StatusCode::BAD_REQUEST,
            json!({
                "error": OAuthErrorCode::InvalidRequest.as_str(),
                "error_description": "Redirect location is not a valid header value",
            }),
        ),
    }
}
