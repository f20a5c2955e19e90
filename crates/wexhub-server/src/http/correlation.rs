//! Request correlation
//!
//! Every response carries `X-Correlation-Id` and `X-Request-Id` with the
//! same value: a client-supplied correlation id if present, else a
//! client-supplied request id, else a fresh UUID.

use hyper::header::HeaderValue;
use hyper::HeaderMap;
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Picks the correlation id for a request
pub fn correlation_id(headers: &HeaderMap) -> String {
    for name in [CORRELATION_HEADER, REQUEST_ID_HEADER] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            let value = value.trim();
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }
    Uuid::new_v4().to_string()
}

/// Stamps both response headers with the chosen id
pub fn stamp(headers: &mut HeaderMap, id: &str) {
    if let Ok(value) = HeaderValue::from_str(id) {
        headers.insert(CORRELATION_HEADER, value.clone());
        headers.insert(REQUEST_ID_HEADER, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_correlation_header() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_HEADER, HeaderValue::from_static("corr-1"));
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-1"));
        assert_eq!(correlation_id(&headers), "corr-1");
    }

    #[test]
    fn test_falls_back_to_request_id() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-1"));
        assert_eq!(correlation_id(&headers), "req-1");
    }

    #[test]
    fn test_generates_fresh_ids() {
        let headers = HeaderMap::new();
        let a = correlation_id(&headers);
        let b = correlation_id(&headers);
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_stamp_sets_both_headers() {
        let mut headers = HeaderMap::new();
        stamp(&mut headers, "the-id");
        assert_eq!(headers.get(CORRELATION_HEADER).unwrap(), "the-id");
        assert_eq!(headers.get(REQUEST_ID_HEADER).unwrap(), "the-id");
    }
}
