//! Personal Access Token entity and wire format
//!
//! A PAT is a user-created long-lived credential bound to one workspace
//! with a chosen scope subset. On the wire it is
//! `ocpat_<prefix><secret>` where both parts are URL-safe base64 without
//! padding: an 8-byte lookup prefix (stored in the clear) and a 32-byte
//! secret (stored only as a PBKDF2 hash).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{PatId, UserId, WorkspaceId};
use super::scope::ScopeSet;

/// Wire prefix identifying a PAT bearer credential
pub const PAT_WIRE_PREFIX: &str = "ocpat_";

/// Raw bytes in the lookup prefix
pub const PAT_PREFIX_BYTES: usize = 8;

/// Raw bytes in the secret part
pub const PAT_SECRET_BYTES: usize = 32;

/// Base64url (no pad) length of the 8-byte prefix
pub const PAT_PREFIX_ENCODED_LEN: usize = 11;

/// Maximum lifetime a PAT may be created with
pub const PAT_MAX_TTL_DAYS: i64 = 365;

/// Splits a wire token into its clear prefix and secret parts
///
/// Returns an authentication error (never a parse detail) so the caller
/// cannot distinguish malformed tokens from unknown ones.
pub fn split_pat(token: &str) -> Result<(&str, &str), DomainError> {
    let rest = token
        .strip_prefix(PAT_WIRE_PREFIX)
        .ok_or_else(invalid_token)?;
    if rest.len() <= PAT_PREFIX_ENCODED_LEN {
        return Err(invalid_token());
    }
    let (prefix, secret) = rest.split_at(PAT_PREFIX_ENCODED_LEN);
    Ok((prefix, secret))
}

fn invalid_token() -> DomainError {
    DomainError::oauth(
        super::errors::OAuthErrorCode::InvalidRequest,
        "Malformed access token",
    )
}

/// A personal access token record; the secret exists only as a hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalAccessToken {
    id: PatId,
    workspace_id: WorkspaceId,
    user_id: UserId,
    name: String,
    description: Option<String>,
    /// Clear lookup key, the base64url prefix part of the wire token
    token_prefix: String,
    /// PBKDF2 hash of the secret part
    token_hash: String,
    scopes: ScopeSet,
    is_revoked: bool,
    revoked_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl PersonalAccessToken {
    /// Creates a new PAT record
    ///
    /// `expires_in_days` is clamped by validation to at most one year;
    /// at least one scope and a non-empty name are required.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workspace_id: WorkspaceId,
        user_id: UserId,
        name: impl Into<String>,
        description: Option<String>,
        token_prefix: String,
        token_hash: String,
        scopes: ScopeSet,
        expires_in_days: Option<i64>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::Validation(
                "Token name must not be empty".to_string(),
            ));
        }
        if scopes.is_empty() {
            return Err(DomainError::Validation(
                "At least one scope is required".to_string(),
            ));
        }
        let now = Utc::now();
        let expires_at = match expires_in_days {
            Some(days) if days < 1 || days > PAT_MAX_TTL_DAYS => {
                return Err(DomainError::Validation(format!(
                    "expiresInDays must be between 1 and {PAT_MAX_TTL_DAYS}"
                )));
            }
            Some(days) => Some(now + chrono::Duration::days(days)),
            None => None,
        };
        Ok(Self {
            id: PatId::new(),
            workspace_id,
            user_id,
            name,
            description,
            token_prefix,
            token_hash,
            scopes,
            is_revoked: false,
            revoked_at: None,
            expires_at,
            last_used_at: None,
            created_at: now,
        })
    }

    /// Reconstitutes a PAT from stored fields
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: PatId,
        workspace_id: WorkspaceId,
        user_id: UserId,
        name: String,
        description: Option<String>,
        token_prefix: String,
        token_hash: String,
        scopes: ScopeSet,
        is_revoked: bool,
        revoked_at: Option<DateTime<Utc>>,
        expires_at: Option<DateTime<Utc>>,
        last_used_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            workspace_id,
            user_id,
            name,
            description,
            token_prefix,
            token_hash,
            scopes,
            is_revoked,
            revoked_at,
            expires_at,
            last_used_at,
            created_at,
        }
    }

    pub fn id(&self) -> PatId {
        self.id
    }

    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn token_prefix(&self) -> &str {
        &self.token_prefix
    }

    pub fn token_hash(&self) -> &str {
        &self.token_hash
    }

    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    pub fn is_revoked(&self) -> bool {
        self.is_revoked
    }

    pub fn revoked_at(&self) -> Option<DateTime<Utc>> {
        self.revoked_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if now > at)
    }

    /// A PAT authenticates only while neither revoked nor expired
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && !self.is_expired(now)
    }

    /// Updates name and description; rejected once revoked
    pub fn update(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<(), DomainError> {
        if self.is_revoked {
            return Err(DomainError::invalid_state("revoked", "updated"));
        }
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::Validation(
                "Token name must not be empty".to_string(),
            ));
        }
        self.name = name;
        self.description = description;
        Ok(())
    }

    /// Revokes the token; idempotent revocation is rejected to surface
    /// client bugs
    pub fn revoke(&mut self) -> Result<(), DomainError> {
        if self.is_revoked {
            return Err(DomainError::invalid_state("revoked", "revoked"));
        }
        self.is_revoked = true;
        self.revoked_at = Some(Utc::now());
        Ok(())
    }

    /// Records a successful authentication (best-effort persistence)
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_used_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scope::Scope;

    fn sample_pat(expires_in_days: Option<i64>) -> Result<PersonalAccessToken, DomainError> {
        PersonalAccessToken::new(
            WorkspaceId::new(),
            UserId::new(),
            "ci-token",
            None,
            "AAAAAAAAAAA".to_string(),
            "pbkdf2-hash".to_string(),
            ScopeSet::from_scopes([Scope::FilesRead]),
            expires_in_days,
        )
    }

    #[test]
    fn test_split_wire_token() {
        let token = "ocpat_AAAAAAAAAAAsecret-part-here";
        let (prefix, secret) = split_pat(token).unwrap();
        assert_eq!(prefix, "AAAAAAAAAAA");
        assert_eq!(secret, "secret-part-here");
    }

    #[test]
    fn test_split_rejects_malformed() {
        assert!(split_pat("not-a-pat").is_err());
        assert!(split_pat("ocpat_short").is_err());
        assert!(split_pat("ocpat_AAAAAAAAAAA").is_err()); // prefix but no secret
    }

    #[test]
    fn test_create_validations() {
        assert!(sample_pat(None).is_ok());
        assert!(sample_pat(Some(365)).is_ok());
        assert!(sample_pat(Some(366)).is_err());
        assert!(sample_pat(Some(0)).is_err());

        let no_scopes = PersonalAccessToken::new(
            WorkspaceId::new(),
            UserId::new(),
            "x",
            None,
            "p".to_string(),
            "h".to_string(),
            ScopeSet::new(),
            None,
        );
        assert!(no_scopes.is_err());
    }

    #[test]
    fn test_revoked_blocks_update_and_auth() {
        let mut pat = sample_pat(None).unwrap();
        assert!(pat.is_active(Utc::now()));
        pat.revoke().unwrap();
        assert!(!pat.is_active(Utc::now()));
        assert!(pat.update("new-name", None).is_err());
        assert!(pat.revoke().is_err());
    }

    #[test]
    fn test_expiry() {
        let pat = sample_pat(Some(1)).unwrap();
        assert!(pat.is_active(Utc::now()));
        assert!(!pat.is_active(Utc::now() + chrono::Duration::days(2)));
    }
}
