//! Personal Access Token service
//!
//! Issue, list, update, revoke, and the authentication path. The wire
//! token is shown once at creation; afterwards only the clear prefix and
//! the PBKDF2 hash exist. Authentication mints the same [`Principal`] the
//! OAuth path produces, so the scope gate is oblivious to which
//! credential arrived.
//!
//! [`Principal`]: wexhub_core::domain::scope::Principal

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use wexhub_core::domain::audit::{AuditEntry, AuditSubject, PatEvent};
use wexhub_core::domain::errors::{DomainError, OAuthErrorCode};
use wexhub_core::domain::identity::WorkspaceRole;
use wexhub_core::domain::newtypes::{PatId, WorkspaceId};
use wexhub_core::domain::pat::{split_pat, PersonalAccessToken};
use wexhub_core::domain::scope::{Principal, Scope, ScopeSet};
use wexhub_audit::AuditRecorder;
use wexhub_core::ports::{IdentityRepository, PatRepository};
use wexhub_core::usecases::AccessGate;

use crate::secrets;

fn transient(e: anyhow::Error) -> DomainError {
    DomainError::Transient(e.to_string())
}

fn invalid_token() -> DomainError {
    DomainError::oauth(OAuthErrorCode::InvalidRequest, "Invalid access token")
}

/// A newly issued PAT with its one-time wire token
pub struct CreatedPat {
    pub pat: PersonalAccessToken,
    /// The full `ocpat_…` credential; never retrievable again
    pub wire_token: String,
}

/// Use case for PAT lifecycle and authentication
pub struct PatService {
    pats: Arc<dyn PatRepository>,
    audit: Arc<AuditRecorder>,
    identity: Arc<dyn IdentityRepository>,
    gate: Arc<AccessGate>,
}

impl PatService {
    pub fn new(
        pats: Arc<dyn PatRepository>,
        audit: Arc<AuditRecorder>,
        identity: Arc<dyn IdentityRepository>,
        gate: Arc<AccessGate>,
    ) -> Self {
        Self {
            pats,
            audit,
            identity,
            gate,
        }
    }

    /// Issues a PAT for the caller, bound to one workspace
    ///
    /// The granted scopes may not exceed what the caller's credential
    /// carries.
    pub async fn create(
        &self,
        principal: &Principal,
        client_ip: Option<&str>,
        workspace_id: WorkspaceId,
        name: &str,
        description: Option<String>,
        scopes: ScopeSet,
        expires_in_days: Option<i64>,
    ) -> Result<CreatedPat, DomainError> {
        self.gate.require_scope(principal, Scope::PatsWrite)?;
        self.gate.workspace_in_scope(principal, workspace_id).await?;
        self.gate
            .require_workspace_role(principal, workspace_id, WorkspaceRole::Member)
            .await?;
        if !principal.scopes.contains_all(&scopes) {
            return Err(DomainError::Validation(
                "A token cannot be granted scopes its creator does not hold".to_string(),
            ));
        }

        let generated = secrets::new_pat();
        let pat = PersonalAccessToken::new(
            workspace_id,
            principal.user_id,
            name,
            description,
            generated.prefix,
            generated.secret_hash,
            scopes,
            expires_in_days,
        )?;

        let entry = self
            .entry(pat.id(), PatEvent::Created, principal, client_ip)
            .with_details(json!({
                "name": pat.name(),
                "scopes": pat.scopes().to_string(),
                "expires_at": pat.expires_at().map(|t| t.to_rfc3339()),
            }));
        self.pats.create_pat(&pat, &entry).await.map_err(transient)?;

        info!(pat_id = %pat.id(), workspace_id = %workspace_id, "PAT created");
        Ok(CreatedPat {
            pat,
            wire_token: generated.wire_token,
        })
    }

    /// Lists the caller's own PATs in a workspace
    pub async fn list(
        &self,
        principal: &Principal,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<PersonalAccessToken>, DomainError> {
        self.gate.require_scope(principal, Scope::PatsRead)?;
        let result: Result<Vec<PersonalAccessToken>, DomainError> = async {
            self.gate.workspace_in_scope(principal, workspace_id).await?;
            self.gate
                .require_workspace_role(principal, workspace_id, WorkspaceRole::Guest)
                .await?;
            self.pats
                .list_pats(workspace_id, principal.user_id)
                .await
                .map_err(transient)
        }
        .await;
        result.map_err(|e| e.masked("workspace"))
    }

    /// Updates a PAT's name/description; owner only, rejected once revoked
    pub async fn update(
        &self,
        principal: &Principal,
        client_ip: Option<&str>,
        pat_id: PatId,
        name: &str,
        description: Option<String>,
    ) -> Result<PersonalAccessToken, DomainError> {
        self.gate.require_scope(principal, Scope::PatsWrite)?;
        let mut pat = self.owned_pat(principal, pat_id).await?;
        pat.update(name, description)?;
        let entry = self
            .entry(pat_id, PatEvent::Updated, principal, client_ip)
            .with_details(json!({"name": pat.name()}));
        self.pats.update_pat(&pat, &entry).await.map_err(transient)?;
        Ok(pat)
    }

    /// Revokes a PAT: the owner may always revoke their own token, a
    /// workspace Admin anyone's
    pub async fn revoke(
        &self,
        principal: &Principal,
        client_ip: Option<&str>,
        pat_id: PatId,
    ) -> Result<PersonalAccessToken, DomainError> {
        self.gate.require_scope(principal, Scope::PatsWrite)?;
        let result: Result<(PersonalAccessToken, PatEvent), DomainError> = async {
            let pat = self
                .pats
                .get_pat(pat_id)
                .await
                .map_err(transient)?
                .ok_or_else(|| DomainError::NotFound("token".to_string()))?;
            self.gate
                .workspace_in_scope(principal, pat.workspace_id())
                .await?;
            let event = if pat.user_id() == principal.user_id {
                self.gate
                    .require_workspace_role(principal, pat.workspace_id(), WorkspaceRole::Guest)
                    .await?;
                PatEvent::RevokedByUser
            } else {
                self.gate
                    .require_workspace_role(principal, pat.workspace_id(), WorkspaceRole::Admin)
                    .await?;
                PatEvent::RevokedByAdmin
            };
            Ok((pat, event))
        }
        .await;
        let (mut pat, event) = result.map_err(|e| e.masked("token"))?;

        pat.revoke()?;
        let entry = self.entry(pat_id, event, principal, client_ip);
        self.pats.update_pat(&pat, &entry).await.map_err(transient)?;
        info!(pat_id = %pat_id, event = %event, "PAT revoked");
        Ok(pat)
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Authenticates an `ocpat_…` bearer credential
    ///
    /// Rejections are uniform so callers cannot distinguish unknown,
    /// revoked, and expired tokens. On success the `last_used_at` write
    /// and the `Used` audit entry are best-effort.
    pub async fn authenticate(
        &self,
        wire_token: &str,
        client_ip: Option<&str>,
    ) -> Result<Principal, DomainError> {
        let (prefix, secret) = split_pat(wire_token)?;
        let pat = self
            .pats
            .get_pat_by_prefix(prefix)
            .await
            .map_err(transient)?
            .ok_or_else(invalid_token)?;

        if !pat.is_active(Utc::now()) {
            return Err(invalid_token());
        }
        if !secrets::verify_secret(secret, pat.token_hash()) {
            warn!(pat_id = %pat.id(), "PAT secret verification failed");
            return Err(invalid_token());
        }

        let user = self
            .identity
            .get_user(pat.user_id())
            .await
            .map_err(transient)?
            .ok_or_else(invalid_token)?;

        // Best-effort bookkeeping; contention here must never fail a request
        let now = Utc::now();
        if let Err(e) = self.pats.touch_last_used(pat.id(), now).await {
            warn!(pat_id = %pat.id(), error = %e, "Failed to update last_used_at");
        }
        let mut used = AuditEntry::new(AuditSubject::Pat {
            pat_id: pat.id(),
            event: PatEvent::Used,
        })
        .with_actor(pat.user_id());
        if let Some(ip) = client_ip {
            used = used.with_ip(ip);
        }
        self.audit.append_detached(&used).await;

        Ok(Principal {
            user_id: pat.user_id(),
            subject: user.subject().to_string(),
            workspace: Some(pat.workspace_id()),
            scopes: pat.scopes().clone(),
        })
    }

    /// Lists a PAT's audit entries; owner or workspace Admin
    pub async fn audit_log(
        &self,
        principal: &Principal,
        pat_id: PatId,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, DomainError> {
        self.gate.require_scope(principal, Scope::PatsRead)?;
        let result: Result<(), DomainError> = async {
            let pat = self
                .pats
                .get_pat(pat_id)
                .await
                .map_err(transient)?
                .ok_or_else(|| DomainError::NotFound("token".to_string()))?;
            self.gate
                .workspace_in_scope(principal, pat.workspace_id())
                .await?;
            if pat.user_id() != principal.user_id {
                self.gate
                    .require_workspace_role(principal, pat.workspace_id(), WorkspaceRole::Admin)
                    .await?;
            }
            Ok(())
        }
        .await;
        result.map_err(|e| e.masked("token"))?;
        self.audit.for_pat(pat_id, limit).await.map_err(transient)
    }

    /// Loads a PAT the caller owns, masked to NotFound
    async fn owned_pat(
        &self,
        principal: &Principal,
        pat_id: PatId,
    ) -> Result<PersonalAccessToken, DomainError> {
        let result: Result<PersonalAccessToken, DomainError> = async {
            let pat = self
                .pats
                .get_pat(pat_id)
                .await
                .map_err(transient)?
                .ok_or_else(|| DomainError::NotFound("token".to_string()))?;
            self.gate
                .workspace_in_scope(principal, pat.workspace_id())
                .await?;
            if pat.user_id() != principal.user_id {
                return Err(DomainError::Authorization(
                    "Only the token owner may modify it".to_string(),
                ));
            }
            Ok(pat)
        }
        .await;
        result.map_err(|e| e.masked("token"))
    }

    fn entry(
        &self,
        pat_id: PatId,
        event: PatEvent,
        principal: &Principal,
        client_ip: Option<&str>,
    ) -> AuditEntry {
        let mut entry =
            AuditEntry::new(AuditSubject::Pat { pat_id, event }).with_actor(principal.user_id);
        if let Some(ip) = client_ip {
            entry = entry.with_ip(ip);
        }
        entry
    }
}
