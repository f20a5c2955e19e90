//! The error translation layer
//!
//! The single place domain errors become HTTP. Handlers bubble
//! `DomainError` up unwrapped; the router maps the result here.

use hyper::header::{HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use hyper::{Response, StatusCode};
use serde_json::json;

use wexhub_core::domain::errors::{DomainError, OAuthErrorCode};

use super::body::{full, HttpBody};

/// A JSON response with the given status
pub fn json_response(status: StatusCode, body: serde_json::Value) -> Response<HttpBody> {
    let mut response = Response::new(full(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Maps a domain error onto the API surface
pub fn api_error(error: DomainError) -> Response<HttpBody> {
    match error {
        DomainError::Validation(message) | DomainError::InvalidId(message) => json_response(
            StatusCode::BAD_REQUEST,
            json!({"error": "validation_error", "message": message}),
        ),
        DomainError::Authentication { code, description } => json_response(
            StatusCode::UNAUTHORIZED,
            json!({"error": code.as_str(), "error_description": description}),
        ),
        DomainError::Authorization(message) => json_response(
            StatusCode::FORBIDDEN,
            json!({"error": "forbidden", "message": message}),
        ),
        DomainError::NotFound(resource) => json_response(
            StatusCode::NOT_FOUND,
            json!({"error": "not_found", "message": format!("{resource} not found")}),
        ),
        DomainError::Conflict(message) => json_response(
            StatusCode::CONFLICT,
            json!({"error": "conflict", "message": message}),
        ),
        DomainError::InvalidState { from, to } => json_response(
            StatusCode::BAD_REQUEST,
            json!({
                "error": "invalid_state",
                "message": format!("Invalid state transition from {from} to {to}"),
            }),
        ),
        DomainError::RateLimited { retry_after_secs } => {
            let mut response = json_response(
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "error": "rate_limited",
                    "message": "Too many requests; retry later",
                    "retryAfterSeconds": retry_after_secs,
                }),
            );
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
            response
        }
        DomainError::Transient(message) => {
            // Bounded-queue admission failures are back-pressure, not
            // server faults
            let status = if message.contains("queue") {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            json_response(
                status,
                json!({"error": "transient_failure", "message": message}),
            )
        }
        DomainError::Permanent(message) => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": "permanent_failure", "message": message}),
        ),
    }
}

/// Maps an OAuth endpoint error per RFC 6749 (401 for client
/// authentication failures, 400 otherwise)
pub fn oauth_error(error: DomainError) -> Response<HttpBody> {
    match error {
        DomainError::Authentication { code, description } => {
            let status = if code == OAuthErrorCode::InvalidClient {
                StatusCode::UNAUTHORIZED
            } else {
                StatusCode::BAD_REQUEST
            };
            json_response(
                status,
                json!({"error": code.as_str(), "error_description": description}),
            )
        }
        other => api_error(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_carries_retry_after() {
        let response = api_error(DomainError::RateLimited {
            retry_after_secs: 17,
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "17");
    }

    #[test]
    fn test_invalid_client_is_401_on_oauth_surface() {
        let err = DomainError::oauth(OAuthErrorCode::InvalidClient, "bad secret");
        assert_eq!(oauth_error(err).status(), StatusCode::UNAUTHORIZED);

        let err = DomainError::oauth(OAuthErrorCode::InvalidGrant, "bad code");
        assert_eq!(oauth_error(err).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_queue_pressure_is_503() {
        let response = api_error(DomainError::Transient(
            "Processing queue is full".to_string(),
        ));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = api_error(DomainError::Transient("db gone".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_not_found_masks_detail() {
        let response = api_error(DomainError::NotFound("file".to_string()));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
