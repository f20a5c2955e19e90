//! Client IP derivation
//!
//! Audit entries record the first token of `X-Forwarded-For` when a
//! proxy supplied one, else the connection's remote address.

/// Derives the client IP for audit purposes
pub fn client_ip(forwarded_for: Option<&str>, remote_addr: Option<&str>) -> Option<String> {
    if let Some(header) = forwarded_for {
        let first = header.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }
    remote_addr
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_for_first_token_wins() {
        assert_eq!(
            client_ip(Some("203.0.113.7, 10.0.0.1"), Some("10.0.0.2")),
            Some("203.0.113.7".to_string())
        );
        assert_eq!(
            client_ip(Some(" 203.0.113.7 "), None),
            Some("203.0.113.7".to_string())
        );
    }

    #[test]
    fn test_falls_back_to_remote() {
        assert_eq!(
            client_ip(None, Some("192.0.2.9")),
            Some("192.0.2.9".to_string())
        );
        assert_eq!(
            client_ip(Some(""), Some("192.0.2.9")),
            Some("192.0.2.9".to_string())
        );
    }

    #[test]
    fn test_nothing_known() {
        assert_eq!(client_ip(None, None), None);
        assert_eq!(client_ip(Some(",,"), None), None);
    }
}
