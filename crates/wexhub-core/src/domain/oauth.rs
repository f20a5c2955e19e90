//! OAuth authorization-server entities
//!
//! Registered apps, one-shot authorization codes, and rotating refresh
//! tokens. Secret material never appears here in the clear: apps store a
//! PBKDF2 hash of their client secret, refresh tokens store a SHA-256 of
//! the wire secret. The PKCE challenge check is pure and lives beside the
//! code entity.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::errors::DomainError;
use super::newtypes::{AppId, UniqueId, UserId, WorkspaceId};
use super::scope::ScopeSet;

/// Authorization-code lifetime
pub const CODE_TTL_MINUTES: i64 = 10;

/// Whether an app can hold a client secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    /// Browser/native app; PKCE is mandatory, no secret
    Public,
    /// Server-side app authenticating with a client secret
    Confidential,
}

impl std::fmt::Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClientType::Public => "public",
            ClientType::Confidential => "confidential",
        };
        write!(f, "{s}")
    }
}

/// PKCE code-challenge method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PkceMethod {
    S256,
    Plain,
}

impl PkceMethod {
    /// Parses the wire form; `S256` and `plain` are the only members
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "S256" => Ok(PkceMethod::S256),
            "plain" => Ok(PkceMethod::Plain),
            other => Err(DomainError::Validation(format!(
                "Unknown code_challenge_method: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PkceMethod::S256 => "S256",
            PkceMethod::Plain => "plain",
        }
    }
}

/// Computes the S256 challenge for a verifier: URL-safe base64 (no pad)
/// of the SHA-256 over the verifier's ASCII bytes.
pub fn s256_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Verifies a presented `code_verifier` against the stored challenge
pub fn verify_pkce(method: PkceMethod, challenge: &str, verifier: &str) -> bool {
    match method {
        PkceMethod::S256 => s256_challenge(verifier) == challenge,
        PkceMethod::Plain => verifier == challenge,
    }
}

/// Hex SHA-256 of a token secret, the stored form of refresh tokens
pub fn sha256_hex(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

// ============================================================================
// OAuthApp
// ============================================================================

/// A registered OAuth application owned by a workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthApp {
    id: AppId,
    workspace_id: WorkspaceId,
    name: String,
    description: Option<String>,
    client_type: ClientType,
    /// Public client identifier presented on the wire
    client_id: String,
    /// PBKDF2 hash of the client secret; Confidential apps only
    client_secret_hash: Option<String>,
    /// Registered redirect URIs, in registration order
    redirect_uris: Vec<String>,
    allowed_scopes: ScopeSet,
    is_enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    created_by: UserId,
}

impl OAuthApp {
    /// Registers a new app
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workspace_id: WorkspaceId,
        name: impl Into<String>,
        description: Option<String>,
        client_type: ClientType,
        client_id: String,
        client_secret_hash: Option<String>,
        redirect_uris: Vec<String>,
        allowed_scopes: ScopeSet,
        created_by: UserId,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::Validation(
                "App name must not be empty".to_string(),
            ));
        }
        if redirect_uris.is_empty() {
            return Err(DomainError::Validation(
                "At least one redirect_uri is required".to_string(),
            ));
        }
        if client_type == ClientType::Confidential && client_secret_hash.is_none() {
            return Err(DomainError::Validation(
                "Confidential clients require a client secret".to_string(),
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: AppId::new(),
            workspace_id,
            name,
            description,
            client_type,
            client_id,
            client_secret_hash,
            redirect_uris,
            allowed_scopes,
            is_enabled: true,
            created_at: now,
            updated_at: now,
            created_by,
        })
    }

    /// Reconstitutes an app from stored fields
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: AppId,
        workspace_id: WorkspaceId,
        name: String,
        description: Option<String>,
        client_type: ClientType,
        client_id: String,
        client_secret_hash: Option<String>,
        redirect_uris: Vec<String>,
        allowed_scopes: ScopeSet,
        is_enabled: bool,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        created_by: UserId,
    ) -> Self {
        Self {
            id,
            workspace_id,
            name,
            description,
            client_type,
            client_id,
            client_secret_hash,
            redirect_uris,
            allowed_scopes,
            is_enabled,
            created_at,
            updated_at,
            created_by,
        }
    }

    pub fn id(&self) -> AppId {
        self.id
    }

    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn client_type(&self) -> ClientType {
        self.client_type
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret_hash(&self) -> Option<&str> {
        self.client_secret_hash.as_deref()
    }

    pub fn redirect_uris(&self) -> &[String] {
        &self.redirect_uris
    }

    pub fn allowed_scopes(&self) -> &ScopeSet {
        &self.allowed_scopes
    }

    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    /// Returns true when `uri` exactly matches a registered redirect URI
    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|r| r == uri)
    }

    /// Updates name, description, redirect URIs and allowed scopes
    pub fn update(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
        redirect_uris: Vec<String>,
        allowed_scopes: ScopeSet,
    ) -> Result<(), DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::Validation(
                "App name must not be empty".to_string(),
            ));
        }
        if redirect_uris.is_empty() {
            return Err(DomainError::Validation(
                "At least one redirect_uri is required".to_string(),
            ));
        }
        self.name = name;
        self.description = description;
        self.redirect_uris = redirect_uris;
        self.allowed_scopes = allowed_scopes;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.is_enabled = enabled;
        self.updated_at = Utc::now();
    }

    /// Replaces the client secret hash after rotation
    pub fn rotate_secret(&mut self, new_hash: String) -> Result<(), DomainError> {
        if self.client_type != ClientType::Confidential {
            return Err(DomainError::Validation(
                "Public clients have no client secret".to_string(),
            ));
        }
        self.client_secret_hash = Some(new_hash);
        self.updated_at = Utc::now();
        Ok(())
    }
}

// ============================================================================
// Authorization codes
// ============================================================================

/// A one-time authorization code
///
/// Indexed by its opaque value; lifetime is minutes, consumption is a
/// conditional update in the store so concurrent redeems pick one winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// The opaque random code value (≥128 bits entropy)
    code: String,
    app_id: AppId,
    user_id: UserId,
    workspace_id: WorkspaceId,
    redirect_uri: String,
    scopes: ScopeSet,
    pkce_challenge: Option<String>,
    pkce_method: Option<PkceMethod>,
    used_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl AuthorizationCode {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        code: String,
        app_id: AppId,
        user_id: UserId,
        workspace_id: WorkspaceId,
        redirect_uri: String,
        scopes: ScopeSet,
        pkce_challenge: Option<String>,
        pkce_method: Option<PkceMethod>,
    ) -> Self {
        let now = Utc::now();
        Self {
            code,
            app_id,
            user_id,
            workspace_id,
            redirect_uri,
            scopes,
            pkce_challenge,
            pkce_method,
            used_at: None,
            expires_at: now + chrono::Duration::minutes(CODE_TTL_MINUTES),
            created_at: now,
        }
    }

    /// Reconstitutes a code from stored fields
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        code: String,
        app_id: AppId,
        user_id: UserId,
        workspace_id: WorkspaceId,
        redirect_uri: String,
        scopes: ScopeSet,
        pkce_challenge: Option<String>,
        pkce_method: Option<PkceMethod>,
        used_at: Option<DateTime<Utc>>,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            code,
            app_id,
            user_id,
            workspace_id,
            redirect_uri,
            scopes,
            pkce_challenge,
            pkce_method,
            used_at,
            expires_at,
            created_at,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    pub fn pkce_challenge(&self) -> Option<&str> {
        self.pkce_challenge.as_deref()
    }

    pub fn pkce_method(&self) -> Option<PkceMethod> {
        self.pkce_method
    }

    pub fn used_at(&self) -> Option<DateTime<Utc>> {
        self.used_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Checks the presented verifier against the stored PKCE binding
    ///
    /// Codes issued without a challenge (confidential clients that skipped
    /// PKCE) accept any absent verifier but reject a supplied one.
    pub fn pkce_matches(&self, verifier: Option<&str>) -> bool {
        match (self.pkce_challenge.as_deref(), self.pkce_method, verifier) {
            (Some(challenge), Some(method), Some(verifier)) => {
                verify_pkce(method, challenge, verifier)
            }
            (None, _, None) => true,
            _ => false,
        }
    }
}

// ============================================================================
// Refresh tokens
// ============================================================================

/// A stored refresh token: hash, family linkage, and revocation state
///
/// Rotation revokes the presented token and mints a successor in the same
/// family. Presenting a revoked member again is reuse, and kills every
/// non-revoked member of the family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// Hex SHA-256 of the wire secret
    token_hash: String,
    app_id: AppId,
    user_id: UserId,
    workspace_id: WorkspaceId,
    scopes: ScopeSet,
    /// Shared across every token in the rotation chain
    family_id: UniqueId,
    /// Hash of the token this one was rotated from
    previous_token_hash: Option<String>,
    revoked_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    last_rotated_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    /// Creates the first token of a new family
    pub fn new_family(
        token_hash: String,
        app_id: AppId,
        user_id: UserId,
        workspace_id: WorkspaceId,
        scopes: ScopeSet,
        ttl_days: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            token_hash,
            app_id,
            user_id,
            workspace_id,
            scopes,
            family_id: UniqueId::new(),
            previous_token_hash: None,
            revoked_at: None,
            expires_at: now + chrono::Duration::days(ttl_days),
            created_at: now,
            last_rotated_at: None,
        }
    }

    /// Mints the successor of `self` during rotation
    pub fn rotate(&self, new_token_hash: String, ttl_days: i64) -> Self {
        let now = Utc::now();
        Self {
            token_hash: new_token_hash,
            app_id: self.app_id,
            user_id: self.user_id,
            workspace_id: self.workspace_id,
            scopes: self.scopes.clone(),
            family_id: self.family_id,
            previous_token_hash: Some(self.token_hash.clone()),
            revoked_at: None,
            expires_at: now + chrono::Duration::days(ttl_days),
            created_at: now,
            last_rotated_at: None,
        }
    }

    /// Reconstitutes a record from stored fields
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        token_hash: String,
        app_id: AppId,
        user_id: UserId,
        workspace_id: WorkspaceId,
        scopes: ScopeSet,
        family_id: UniqueId,
        previous_token_hash: Option<String>,
        revoked_at: Option<DateTime<Utc>>,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
        last_rotated_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            token_hash,
            app_id,
            user_id,
            workspace_id,
            scopes,
            family_id,
            previous_token_hash,
            revoked_at,
            expires_at,
            created_at,
            last_rotated_at,
        }
    }

    pub fn token_hash(&self) -> &str {
        &self.token_hash
    }

    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    pub fn family_id(&self) -> UniqueId {
        self.family_id
    }

    pub fn previous_token_hash(&self) -> Option<&str> {
        self.previous_token_hash.as_deref()
    }

    pub fn revoked_at(&self) -> Option<DateTime<Utc>> {
        self.revoked_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_rotated_at(&self) -> Option<DateTime<Utc>> {
        self.last_rotated_at
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// A token is redeemable when neither revoked nor expired
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scope::Scope;

    mod pkce_tests {
        use super::*;

        #[test]
        fn test_s256_known_vector() {
            // RFC 7636 appendix B
            let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
            assert_eq!(
                s256_challenge(verifier),
                "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
            );
            assert!(verify_pkce(
                PkceMethod::S256,
                "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
                verifier
            ));
        }

        #[test]
        fn test_s256_mismatch() {
            assert!(!verify_pkce(PkceMethod::S256, "wrong", "verifier"));
        }

        #[test]
        fn test_plain_byte_equality() {
            assert!(verify_pkce(PkceMethod::Plain, "same-value", "same-value"));
            assert!(!verify_pkce(PkceMethod::Plain, "a", "b"));
        }

        #[test]
        fn test_method_parse() {
            assert_eq!(PkceMethod::parse("S256").unwrap(), PkceMethod::S256);
            assert_eq!(PkceMethod::parse("plain").unwrap(), PkceMethod::Plain);
            assert!(PkceMethod::parse("s256").is_err());
        }
    }

    mod app_tests {
        use super::*;

        fn public_app() -> OAuthApp {
            OAuthApp::new(
                WorkspaceId::new(),
                "Viewer",
                None,
                ClientType::Public,
                "client-123".to_string(),
                None,
                vec!["https://example.com/cb".to_string()],
                ScopeSet::from_scopes([Scope::FilesRead, Scope::ModelsRead]),
                UserId::new(),
            )
            .unwrap()
        }

        #[test]
        fn test_confidential_requires_secret() {
            let err = OAuthApp::new(
                WorkspaceId::new(),
                "Backend",
                None,
                ClientType::Confidential,
                "client-456".to_string(),
                None,
                vec!["https://example.com/cb".to_string()],
                ScopeSet::new(),
                UserId::new(),
            );
            assert!(err.is_err());
        }

        #[test]
        fn test_redirect_uri_exact_match() {
            let app = public_app();
            assert!(app.has_redirect_uri("https://example.com/cb"));
            assert!(!app.has_redirect_uri("https://example.com/cb/"));
            assert!(!app.has_redirect_uri("https://attacker.com/cb"));
        }

        #[test]
        fn test_rotate_secret_public_rejected() {
            let mut app = public_app();
            assert!(app.rotate_secret("hash".to_string()).is_err());
        }
    }

    mod code_tests {
        use super::*;

        fn code_with_challenge() -> AuthorizationCode {
            AuthorizationCode::new(
                "code-value".to_string(),
                AppId::new(),
                UserId::new(),
                WorkspaceId::new(),
                "https://example.com/cb".to_string(),
                ScopeSet::new(),
                Some(s256_challenge("the-verifier")),
                Some(PkceMethod::S256),
            )
        }

        #[test]
        fn test_expiry_window() {
            let code = code_with_challenge();
            assert!(!code.is_expired(Utc::now()));
            assert!(code.is_expired(Utc::now() + chrono::Duration::minutes(CODE_TTL_MINUTES + 1)));
        }

        #[test]
        fn test_pkce_binding() {
            let code = code_with_challenge();
            assert!(code.pkce_matches(Some("the-verifier")));
            assert!(!code.pkce_matches(Some("other-verifier")));
            assert!(!code.pkce_matches(None));
        }

        #[test]
        fn test_no_challenge_accepts_absent_verifier_only() {
            let code = AuthorizationCode::new(
                "c".to_string(),
                AppId::new(),
                UserId::new(),
                WorkspaceId::new(),
                "https://example.com/cb".to_string(),
                ScopeSet::new(),
                None,
                None,
            );
            assert!(code.pkce_matches(None));
            assert!(!code.pkce_matches(Some("anything")));
        }
    }

    mod refresh_tests {
        use super::*;

        #[test]
        fn test_rotation_keeps_family_and_links_previous() {
            let first = RefreshTokenRecord::new_family(
                sha256_hex("secret-0"),
                AppId::new(),
                UserId::new(),
                WorkspaceId::new(),
                ScopeSet::from_scopes([Scope::FilesRead]),
                30,
            );
            let second = first.rotate(sha256_hex("secret-1"), 30);

            assert_eq!(second.family_id(), first.family_id());
            assert_eq!(second.previous_token_hash(), Some(first.token_hash()));
            assert_eq!(second.scopes(), first.scopes());
            assert!(second.is_active(Utc::now()));
        }

        #[test]
        fn test_sha256_hex_is_stable() {
            assert_eq!(sha256_hex("abc").len(), 64);
            assert_eq!(sha256_hex("abc"), sha256_hex("abc"));
            assert_ne!(sha256_hex("abc"), sha256_hex("abd"));
        }
    }
}
