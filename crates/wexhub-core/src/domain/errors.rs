//! Domain error taxonomy
//!
//! The closed error set every use case classifies into. A single
//! translation layer in the server crate maps these onto HTTP statuses;
//! nothing below that layer knows about status codes.

use thiserror::Error;

/// RFC 6749 error codes surfaced by the OAuth endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthErrorCode {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    InvalidScope,
    UnsupportedGrantType,
    UnsupportedResponseType,
}

impl OAuthErrorCode {
    /// The wire form of the code, as it appears in `error` fields
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthErrorCode::InvalidRequest => "invalid_request",
            OAuthErrorCode::InvalidClient => "invalid_client",
            OAuthErrorCode::InvalidGrant => "invalid_grant",
            OAuthErrorCode::InvalidScope => "invalid_scope",
            OAuthErrorCode::UnsupportedGrantType => "unsupported_grant_type",
            OAuthErrorCode::UnsupportedResponseType => "unsupported_response_type",
        }
    }
}

impl std::fmt::Display for OAuthErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur in domain operations
///
/// The variants form the complete failure taxonomy of the system:
/// everything a use case can reject with is one of these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input rejected; the message identifies the offending field
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Missing, invalid, or expired credential
    #[error("Authentication failed: {code}: {description}")]
    Authentication {
        /// RFC 6749 error code
        code: OAuthErrorCode,
        /// Human-readable description, stable enough for tests
        description: String,
    },

    /// Scope or role insufficient for the operation
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Resource absent, or hidden by authorization on an
    /// existence-sensitive read
    #[error("Not found: {0}")]
    NotFound(String),

    /// Precondition violated (already a member, pending invite exists)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// State-machine transition rejected
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Fixed-window admission rejected the request
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the current window closes
        retry_after_secs: u64,
    },

    /// Storage or database I/O failure; retriable by the client
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Handler failure during processing; recorded on the version, no retry
    #[error("Permanent failure: {0}")]
    Permanent(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

impl DomainError {
    /// Shorthand for an [`DomainError::Authentication`] with the given code
    pub fn oauth(code: OAuthErrorCode, description: impl Into<String>) -> Self {
        DomainError::Authentication {
            code,
            description: description.into(),
        }
    }

    /// Shorthand for [`DomainError::InvalidState`]
    pub fn invalid_state(from: impl Into<String>, to: impl Into<String>) -> Self {
        DomainError::InvalidState {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Masks authorization failures as NotFound for existence-sensitive
    /// reads, preventing resource enumeration.
    pub fn masked(self, resource: impl Into<String>) -> Self {
        match self {
            DomainError::Authorization(_) | DomainError::NotFound(_) => {
                DomainError::NotFound(resource.into())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::Validation("fileName must not be empty".to_string());
        assert_eq!(
            err.to_string(),
            "Validation failed: fileName must not be empty"
        );

        let err = DomainError::invalid_state("Committed", "Uploading");
        assert_eq!(
            err.to_string(),
            "Invalid state transition from Committed to Uploading"
        );
    }

    #[test]
    fn test_oauth_codes_wire_form() {
        assert_eq!(OAuthErrorCode::InvalidGrant.as_str(), "invalid_grant");
        assert_eq!(
            OAuthErrorCode::UnsupportedGrantType.as_str(),
            "unsupported_grant_type"
        );
    }

    #[test]
    fn test_masking_hides_authorization() {
        let err = DomainError::Authorization("viewer role required".to_string());
        assert_eq!(
            err.masked("file"),
            DomainError::NotFound("file".to_string())
        );

        // Non-authorization errors pass through untouched
        let err = DomainError::Conflict("already a member".to_string());
        assert_eq!(
            err.clone().masked("file"),
            DomainError::Conflict("already a member".to_string())
        );
    }
}
