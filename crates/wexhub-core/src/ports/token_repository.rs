//! Token repository ports (driven/secondary ports)
//!
//! Persistence for OAuth apps, authorization codes, refresh-token
//! families, and personal access tokens.
//!
//! ## Design Notes
//!
//! - Code consumption and refresh revocation are **conditional updates**
//!   (`used_at IS NULL` / `revoked_at IS NULL`) returning whether the
//!   caller won, so concurrent redeem attempts select exactly one winner.
//! - Lifecycle mutations take the audit entry that must land in the same
//!   transaction; a rolled-back action takes its audit row down with it.

use chrono::{DateTime, Utc};

use crate::domain::audit::AuditEntry;
use crate::domain::newtypes::{AppId, PatId, UniqueId, UserId, WorkspaceId};
use crate::domain::oauth::{AuthorizationCode, OAuthApp, RefreshTokenRecord};
use crate::domain::pat::PersonalAccessToken;

/// Port trait for OAuth app, code, and refresh-token persistence
#[async_trait::async_trait]
pub trait OAuthRepository: Send + Sync {
    // --- App operations ---

    /// Inserts an app and its Created audit entry atomically
    async fn create_app(&self, app: &OAuthApp, audit: &AuditEntry) -> anyhow::Result<()>;

    /// Retrieves an app by id
    async fn get_app(&self, id: AppId) -> anyhow::Result<Option<OAuthApp>>;

    /// Retrieves an app by its public client identifier
    async fn get_app_by_client_id(&self, client_id: &str) -> anyhow::Result<Option<OAuthApp>>;

    /// Lists a workspace's apps, newest first
    async fn list_apps(&self, workspace_id: WorkspaceId) -> anyhow::Result<Vec<OAuthApp>>;

    /// Updates an app and appends the given audit entry atomically
    async fn update_app(&self, app: &OAuthApp, audit: &AuditEntry) -> anyhow::Result<()>;

    /// Deletes an app; its codes, refresh tokens, and audit logs cascade
    async fn delete_app(&self, id: AppId) -> anyhow::Result<()>;

    // --- Authorization code operations ---

    /// Persists a freshly issued code
    async fn insert_code(&self, code: &AuthorizationCode) -> anyhow::Result<()>;

    /// Retrieves a code row by its opaque value
    async fn get_code(&self, code: &str) -> anyhow::Result<Option<AuthorizationCode>>;

    /// Marks a code used iff it is still unused; returns true when this
    /// caller won the consumption race
    async fn consume_code(&self, code: &str, now: DateTime<Utc>) -> anyhow::Result<bool>;

    // --- Refresh token operations ---

    /// Inserts a refresh token; when `audit` is set, the entry lands in
    /// the same transaction (RefreshTokenIssued)
    async fn insert_refresh_token(
        &self,
        token: &RefreshTokenRecord,
        audit: Option<&AuditEntry>,
    ) -> anyhow::Result<()>;

    /// Retrieves a refresh token by its stored hash
    async fn get_refresh_token(&self, token_hash: &str)
        -> anyhow::Result<Option<RefreshTokenRecord>>;

    /// Revokes a token iff not yet revoked; returns true when this caller
    /// won the revocation race
    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    /// Revokes every non-revoked member of a family (reuse response);
    /// returns the number of tokens revoked
    async fn revoke_family(&self, family_id: UniqueId, now: DateTime<Utc>)
        -> anyhow::Result<u64>;
}

/// Port trait for personal access token persistence
#[async_trait::async_trait]
pub trait PatRepository: Send + Sync {
    /// Inserts a PAT and its Created audit entry atomically
    async fn create_pat(&self, pat: &PersonalAccessToken, audit: &AuditEntry)
        -> anyhow::Result<()>;

    /// Retrieves a PAT by id
    async fn get_pat(&self, id: PatId) -> anyhow::Result<Option<PersonalAccessToken>>;

    /// Retrieves a PAT by its clear lookup prefix
    async fn get_pat_by_prefix(&self, prefix: &str)
        -> anyhow::Result<Option<PersonalAccessToken>>;

    /// Lists a user's PATs in a workspace, newest first
    async fn list_pats(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
    ) -> anyhow::Result<Vec<PersonalAccessToken>>;

    /// Updates a PAT and appends the given audit entry atomically
    async fn update_pat(&self, pat: &PersonalAccessToken, audit: &AuditEntry)
        -> anyhow::Result<()>;

    /// Best-effort `last_used_at` write; outside any transaction
    async fn touch_last_used(&self, id: PatId, at: DateTime<Utc>) -> anyhow::Result<()>;
}
