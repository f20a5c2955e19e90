//! OAuth authorization server
//!
//! The `/authorize`, `/token`, and `/revoke` flows:
//!
//! ```text
//! Client → /authorize → [validate] → issue code → redirect with code
//!        → /token(code) → [validate+consume] → issue access+refresh
//!        → /token(refresh) → rotate within the family
//!        → /revoke(refresh) → revoke
//! ```
//!
//! Failure routing on `/authorize` is security-critical: an unresolvable
//! client or an unregistered redirect URI must answer 400 JSON and never
//! redirect, or an attacker-controlled URI could exfiltrate codes. Every
//! later failure redirects back with `error` in the query string.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use wexhub_core::domain::audit::{AuditEntry, AuditSubject, OAuthAppEvent};
use wexhub_core::domain::errors::{DomainError, OAuthErrorCode};
use wexhub_core::domain::newtypes::UserId;
use wexhub_core::domain::oauth::{
    sha256_hex, AuthorizationCode, ClientType, OAuthApp, PkceMethod, RefreshTokenRecord,
};
use wexhub_core::domain::scope::ScopeSet;
use wexhub_core::ports::{IdentityRepository, OAuthRepository};

use crate::jwt::TokenIssuer;
use crate::secrets;

fn transient(e: anyhow::Error) -> DomainError {
    DomainError::Transient(e.to_string())
}

// ============================================================================
// Requests and responses
// ============================================================================

/// Query parameters of an `/authorize` request
#[derive(Debug, Clone, Default)]
pub struct AuthorizeRequest {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// How an `/authorize` request was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeRejection {
    /// Unrecoverable: answer 400 JSON, never redirect
    BadRequest {
        code: OAuthErrorCode,
        description: String,
    },
    /// Recoverable: 302 back to the registered redirect URI with `error`
    Redirect { location: String },
}

/// Form parameters of a `/token` request
#[derive(Debug, Clone, Default)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
}

/// A successful `/token` response body
#[derive(Debug, Clone, Serialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

// ============================================================================
// OAuthService
// ============================================================================

/// The authorization server
pub struct OAuthService {
    oauth: Arc<dyn OAuthRepository>,
    identity: Arc<dyn IdentityRepository>,
    issuer: Arc<TokenIssuer>,
    refresh_ttl_days: i64,
}

impl OAuthService {
    pub fn new(
        oauth: Arc<dyn OAuthRepository>,
        identity: Arc<dyn IdentityRepository>,
        issuer: Arc<TokenIssuer>,
        refresh_ttl_days: i64,
    ) -> Self {
        Self {
            oauth,
            identity,
            issuer,
            refresh_ttl_days,
        }
    }

    // ========================================================================
    // /authorize
    // ========================================================================

    /// Handles an authorization request for an already-authenticated
    /// resource owner; returns the redirect location carrying the code
    pub async fn authorize(
        &self,
        user_id: UserId,
        request: AuthorizeRequest,
    ) -> Result<String, AuthorizeRejection> {
        // (a) The client must resolve before anything may redirect
        let client_id = request.client_id.as_deref().unwrap_or_default();
        let app = self
            .oauth
            .get_app_by_client_id(client_id)
            .await
            .map_err(|e| AuthorizeRejection::BadRequest {
                code: OAuthErrorCode::InvalidRequest,
                description: format!("Failed to resolve client: {e}"),
            })?
            .filter(|app| app.is_enabled())
            .ok_or_else(|| AuthorizeRejection::BadRequest {
                code: OAuthErrorCode::InvalidRequest,
                description: "Unknown or disabled client_id".to_string(),
            })?;

        // (b) The redirect_uri must be registered, or codes could leak to
        // an attacker-chosen location
        let redirect_uri = request.redirect_uri.as_deref().unwrap_or_default();
        if !app.has_redirect_uri(redirect_uri) {
            return Err(AuthorizeRejection::BadRequest {
                code: OAuthErrorCode::InvalidRequest,
                description: "redirect_uri is not registered for this client".to_string(),
            });
        }
        let redirect_url = Url::parse(redirect_uri).map_err(|_| {
            AuthorizeRejection::BadRequest {
                code: OAuthErrorCode::InvalidRequest,
                description: "redirect_uri is not a valid URL".to_string(),
            }
        })?;

        // From here on, failures go back to the validated redirect URI
        let reject = |code: OAuthErrorCode, description: &str| AuthorizeRejection::Redirect {
            location: error_redirect(&redirect_url, code, description, request.state.as_deref()),
        };

        // (c) response_type
        if request.response_type.as_deref() != Some("code") {
            return Err(reject(
                OAuthErrorCode::UnsupportedResponseType,
                "Only response_type=code is supported",
            ));
        }

        // (d) PKCE: mandatory for public clients, S256 by default
        let (challenge, method) = match (&request.code_challenge, &request.code_challenge_method)
        {
            (Some(challenge), maybe_method) => {
                let method = match maybe_method.as_deref() {
                    None => PkceMethod::S256,
                    Some(raw) => PkceMethod::parse(raw).map_err(|_| {
                        reject(
                            OAuthErrorCode::InvalidRequest,
                            "Unsupported code_challenge_method",
                        )
                    })?,
                };
                (Some(challenge.clone()), Some(method))
            }
            (None, _) => {
                if app.client_type() == ClientType::Public {
                    return Err(reject(
                        OAuthErrorCode::InvalidRequest,
                        "code_challenge is required for public clients",
                    ));
                }
                (None, None)
            }
        };

        // (e) Every requested scope must be allowed for the app
        let scopes = match ScopeSet::parse(request.scope.as_deref().unwrap_or_default()) {
            Ok(scopes) if !scopes.is_empty() => scopes,
            _ => {
                return Err(reject(
                    OAuthErrorCode::InvalidScope,
                    "Unknown or empty scope",
                ));
            }
        };
        if !app.allowed_scopes().contains_all(&scopes) {
            return Err(reject(
                OAuthErrorCode::InvalidScope,
                "Requested scope exceeds the scopes allowed for this client",
            ));
        }

        // Issue and persist the one-shot code
        let code_value = secrets::new_authorization_code();
        let code = AuthorizationCode::new(
            code_value.clone(),
            app.id(),
            user_id,
            app.workspace_id(),
            redirect_uri.to_string(),
            scopes,
            challenge,
            method,
        );
        self.oauth
            .insert_code(&code)
            .await
            .map_err(|e| AuthorizeRejection::BadRequest {
                code: OAuthErrorCode::InvalidRequest,
                description: format!("Failed to persist authorization code: {e}"),
            })?;

        info!(app_id = %app.id(), user_id = %user_id, "Authorization code issued");
        Ok(code_redirect(
            &redirect_url,
            &code_value,
            request.state.as_deref(),
        ))
    }

    // ========================================================================
    // /token
    // ========================================================================

    /// Handles a token request
    pub async fn token(
        &self,
        request: TokenRequest,
        client_ip: Option<&str>,
    ) -> Result<TokenGrant, DomainError> {
        let app = self.authenticate_client(&request).await?;

        match request.grant_type.as_deref() {
            Some("authorization_code") => self.redeem_code(&app, &request, client_ip).await,
            Some("refresh_token") => self.rotate_refresh(&app, &request, client_ip).await,
            Some(_) => Err(DomainError::oauth(
                OAuthErrorCode::UnsupportedGrantType,
                "Unsupported grant_type",
            )),
            None => Err(DomainError::oauth(
                OAuthErrorCode::InvalidRequest,
                "grant_type is required",
            )),
        }
    }

    /// Locates the app and, for confidential clients, verifies the secret
    async fn authenticate_client(&self, request: &TokenRequest) -> Result<OAuthApp, DomainError> {
        let client_id = request.client_id.as_deref().ok_or_else(|| {
            DomainError::oauth(OAuthErrorCode::InvalidRequest, "client_id is required")
        })?;
        let app = self
            .oauth
            .get_app_by_client_id(client_id)
            .await
            .map_err(transient)?
            .filter(|app| app.is_enabled())
            .ok_or_else(|| {
                DomainError::oauth(OAuthErrorCode::InvalidClient, "Unknown or disabled client")
            })?;

        if app.client_type() == ClientType::Confidential {
            let presented = request.client_secret.as_deref().ok_or_else(|| {
                DomainError::oauth(OAuthErrorCode::InvalidClient, "client_secret is required")
            })?;
            let stored = app.client_secret_hash().ok_or_else(|| {
                DomainError::oauth(OAuthErrorCode::InvalidClient, "Client has no secret")
            })?;
            if !secrets::verify_secret(presented, stored) {
                warn!(app_id = %app.id(), "Client secret verification failed");
                return Err(DomainError::oauth(
                    OAuthErrorCode::InvalidClient,
                    "Client authentication failed",
                ));
            }
        }
        Ok(app)
    }

    /// `grant_type=authorization_code`
    ///
    /// The code is consumed before validation so a mismatching exchange
    /// still burns it; one-shot regardless of outcome.
    async fn redeem_code(
        &self,
        app: &OAuthApp,
        request: &TokenRequest,
        client_ip: Option<&str>,
    ) -> Result<TokenGrant, DomainError> {
        let invalid_grant =
            |description: &str| DomainError::oauth(OAuthErrorCode::InvalidGrant, description);

        let code_value = request.code.as_deref().ok_or_else(|| {
            DomainError::oauth(OAuthErrorCode::InvalidRequest, "code is required")
        })?;
        let code = self
            .oauth
            .get_code(code_value)
            .await
            .map_err(transient)?
            .ok_or_else(|| invalid_grant("Unknown authorization code"))?;

        // Exactly one concurrent redeemer wins the conditional update
        let won = self
            .oauth
            .consume_code(code_value, Utc::now())
            .await
            .map_err(transient)?;
        if !won {
            warn!(app_id = %app.id(), "Authorization code replayed");
            return Err(invalid_grant("Authorization code already used"));
        }

        if code.is_expired(Utc::now()) {
            return Err(invalid_grant("Authorization code expired"));
        }
        if code.app_id() != app.id() {
            return Err(invalid_grant("Authorization code was issued to another client"));
        }
        if request.redirect_uri.as_deref() != Some(code.redirect_uri()) {
            return Err(invalid_grant("redirect_uri does not match the authorization request"));
        }
        if !code.pkce_matches(request.code_verifier.as_deref()) {
            return Err(invalid_grant("PKCE verification failed"));
        }

        let user = self
            .identity
            .get_user(code.user_id())
            .await
            .map_err(transient)?
            .ok_or_else(|| invalid_grant("Authorization code subject no longer exists"))?;

        let refresh_wire = secrets::new_refresh_token();
        let record = RefreshTokenRecord::new_family(
            sha256_hex(&refresh_wire),
            app.id(),
            code.user_id(),
            code.workspace_id(),
            code.scopes().clone(),
            self.refresh_ttl_days,
        );
        let mut audit = AuditEntry::new(AuditSubject::OAuthApp {
            app_id: app.id(),
            event: OAuthAppEvent::RefreshTokenIssued,
        })
        .with_actor(code.user_id())
        .with_details(json!({
            "grant_type": "authorization_code",
            "family_id": record.family_id().to_string(),
            "scopes": code.scopes().to_string(),
        }));
        if let Some(ip) = client_ip {
            audit = audit.with_ip(ip);
        }
        self.oauth
            .insert_refresh_token(&record, Some(&audit))
            .await
            .map_err(transient)?;

        let access_token = self.issuer.issue(
            user.subject(),
            Some(code.workspace_id()),
            code.scopes(),
            app.client_id(),
        )?;

        info!(app_id = %app.id(), user_id = %code.user_id(), "Authorization code redeemed");
        Ok(TokenGrant {
            access_token,
            token_type: "Bearer",
            expires_in: self.issuer.ttl_secs(),
            refresh_token: Some(refresh_wire),
            scope: code.scopes().to_string(),
        })
    }

    /// `grant_type=refresh_token`
    ///
    /// Presenting a revoked family member is reuse: every non-revoked
    /// descendant and ancestor in the family is revoked before the caller
    /// gets `invalid_grant`.
    async fn rotate_refresh(
        &self,
        app: &OAuthApp,
        request: &TokenRequest,
        client_ip: Option<&str>,
    ) -> Result<TokenGrant, DomainError> {
        let invalid_grant =
            |description: &str| DomainError::oauth(OAuthErrorCode::InvalidGrant, description);

        let presented = request.refresh_token.as_deref().ok_or_else(|| {
            DomainError::oauth(OAuthErrorCode::InvalidRequest, "refresh_token is required")
        })?;
        let hash = sha256_hex(presented);
        let record = self
            .oauth
            .get_refresh_token(&hash)
            .await
            .map_err(transient)?
            .ok_or_else(|| invalid_grant("Unknown refresh token"))?;

        if record.app_id() != app.id() {
            return Err(invalid_grant("Refresh token was issued to another client"));
        }
        if record.is_revoked() {
            // Reuse detected: kill the whole family
            let killed = self
                .oauth
                .revoke_family(record.family_id(), Utc::now())
                .await
                .map_err(transient)?;
            warn!(
                app_id = %app.id(),
                family_id = %record.family_id(),
                revoked = killed,
                "Refresh token reuse detected; family revoked"
            );
            return Err(invalid_grant("Refresh token reuse detected"));
        }
        if record.is_expired(Utc::now()) {
            return Err(invalid_grant("Refresh token expired"));
        }

        // Rotate: revoke the presented token, losing the race means a
        // concurrent rotation beat us, which is reuse from our side
        let won = self
            .oauth
            .revoke_refresh_token(&hash, Utc::now())
            .await
            .map_err(transient)?;
        if !won {
            let killed = self
                .oauth
                .revoke_family(record.family_id(), Utc::now())
                .await
                .map_err(transient)?;
            warn!(
                app_id = %app.id(),
                family_id = %record.family_id(),
                revoked = killed,
                "Concurrent refresh rotation; family revoked"
            );
            return Err(invalid_grant("Refresh token reuse detected"));
        }

        let user = self
            .identity
            .get_user(record.user_id())
            .await
            .map_err(transient)?
            .ok_or_else(|| invalid_grant("Refresh token subject no longer exists"))?;

        let next_wire = secrets::new_refresh_token();
        let next = record.rotate(sha256_hex(&next_wire), self.refresh_ttl_days);
        let mut audit = AuditEntry::new(AuditSubject::OAuthApp {
            app_id: app.id(),
            event: OAuthAppEvent::RefreshTokenIssued,
        })
        .with_actor(record.user_id())
        .with_details(json!({
            "grant_type": "refresh_token",
            "family_id": record.family_id().to_string(),
        }));
        if let Some(ip) = client_ip {
            audit = audit.with_ip(ip);
        }
        self.oauth
            .insert_refresh_token(&next, Some(&audit))
            .await
            .map_err(transient)?;

        let access_token = self.issuer.issue(
            user.subject(),
            Some(record.workspace_id()),
            record.scopes(),
            app.client_id(),
        )?;

        info!(app_id = %app.id(), family_id = %record.family_id(), "Refresh token rotated");
        Ok(TokenGrant {
            access_token,
            token_type: "Bearer",
            expires_in: self.issuer.ttl_secs(),
            refresh_token: Some(next_wire),
            scope: record.scopes().to_string(),
        })
    }

    // ========================================================================
    // /revoke
    // ========================================================================

    /// Revokes a refresh token
    ///
    /// Per RFC 7009 this always succeeds, including for unknown or
    /// malformed tokens; access tokens are stateless and expire on their
    /// own.
    pub async fn revoke(&self, token: &str) {
        let hash = sha256_hex(token);
        match self.oauth.revoke_refresh_token(&hash, Utc::now()).await {
            Ok(true) => info!("Refresh token revoked"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Revocation lookup failed"),
        }
    }
}

// ============================================================================
// Redirect construction
// ============================================================================

/// Builds the success redirect: `redirect_uri?code=…&state=…`
fn code_redirect(redirect_uri: &Url, code: &str, state: Option<&str>) -> String {
    let mut url = redirect_uri.clone();
    url.query_pairs_mut().append_pair("code", code);
    if let Some(state) = state {
        url.query_pairs_mut().append_pair("state", state);
    }
    url.to_string()
}

/// Builds an error redirect with `error`, `error_description`, `state`
fn error_redirect(
    redirect_uri: &Url,
    code: OAuthErrorCode,
    description: &str,
    state: Option<&str>,
) -> String {
    let mut url = redirect_uri.clone();
    url.query_pairs_mut()
        .append_pair("error", code.as_str())
        .append_pair("error_description", description);
    if let Some(state) = state {
        url.query_pairs_mut().append_pair("state", state);
    }
    url.to_string()
}
