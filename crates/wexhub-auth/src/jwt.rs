//! Access-token minting and verification
//!
//! Access tokens are HS256 JWTs carrying `sub` (the user's external
//! subject), `tid` (the workspace the token is bound to), `scp`
//! (space-joined scopes), `client_id`, `iat`, `exp`, and `jti`. They are
//! stateless: revocation relies on the short expiry, not on `/revoke`.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use wexhub_core::domain::errors::{DomainError, OAuthErrorCode};
use wexhub_core::domain::newtypes::WorkspaceId;
use wexhub_core::domain::scope::ScopeSet;

/// Claims carried by a WexHub access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Issuer
    pub iss: String,
    /// The user's opaque external subject
    pub sub: String,
    /// Workspace binding, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
    /// Space-joined scope set
    pub scp: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Issued-at, seconds since epoch
    pub iat: i64,
    /// Expiry, seconds since epoch
    pub exp: i64,
    /// Token id
    pub jti: String,
}

impl AccessTokenClaims {
    /// Parses the `tid` claim into a workspace id
    pub fn workspace(&self) -> Result<Option<WorkspaceId>, DomainError> {
        self.tid
            .as_deref()
            .map(|t| t.parse::<WorkspaceId>())
            .transpose()
            .map_err(|_| {
                DomainError::oauth(OAuthErrorCode::InvalidRequest, "Malformed tid claim")
            })
    }

    /// Parses the `scp` claim into a scope set
    pub fn scopes(&self) -> Result<ScopeSet, DomainError> {
        ScopeSet::parse(&self.scp).map_err(|_| {
            DomainError::oauth(OAuthErrorCode::InvalidRequest, "Malformed scp claim")
        })
    }
}

/// Signs and verifies access tokens with a process-wide HMAC key
///
/// The key is loaded from configuration at startup; rotation is
/// out-of-band (restart with the new key).
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl_secs: u64,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], issuer: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            ttl_secs,
        }
    }

    /// Access-token lifetime in seconds, echoed as `expires_in`
    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Mints a signed access token
    pub fn issue(
        &self,
        subject: &str,
        workspace: Option<WorkspaceId>,
        scopes: &ScopeSet,
        client_id: &str,
    ) -> Result<String, DomainError> {
        let now = Utc::now().timestamp();
        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            tid: workspace.map(|w| w.to_string()),
            scp: scopes.to_string(),
            client_id: client_id.to_string(),
            iat: now,
            exp: now + self.ttl_secs as i64,
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| DomainError::Transient(format!("Failed to sign access token: {e}")))
    }

    /// Verifies signature, expiry, and issuer; returns the claims
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, DomainError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        decode::<AccessTokenClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| {
                DomainError::oauth(
                    OAuthErrorCode::InvalidRequest,
                    "Invalid or expired access token",
                )
            })
    }
}
