//! OAuth application administration
//!
//! Workspace Admins register and manage the OAuth apps of their
//! workspace. Every lifecycle mutation appends its audit entry inside the
//! same store transaction; secret material is returned exactly once at
//! generation time.

use std::sync::Arc;

use serde_json::json;
use tracing::info;
use url::Url;

use wexhub_core::domain::audit::{AuditEntry, AuditSubject, OAuthAppEvent};
use wexhub_core::domain::errors::DomainError;
use wexhub_core::domain::identity::WorkspaceRole;
use wexhub_core::domain::newtypes::{AppId, WorkspaceId};
use wexhub_core::domain::oauth::{ClientType, OAuthApp};
use wexhub_core::domain::scope::{Principal, Scope, ScopeSet};
use wexhub_audit::AuditRecorder;
use wexhub_core::ports::OAuthRepository;
use wexhub_core::usecases::AccessGate;

use crate::secrets;

fn transient(e: anyhow::Error) -> DomainError {
    DomainError::Transient(e.to_string())
}

/// A newly registered app with its one-time secret
pub struct CreatedApp {
    pub app: OAuthApp,
    /// Present for confidential clients only; never retrievable again
    pub client_secret: Option<String>,
}

/// Use case for OAuth app administration
pub struct AppService {
    oauth: Arc<dyn OAuthRepository>,
    audit: Arc<AuditRecorder>,
    gate: Arc<AccessGate>,
}

impl AppService {
    pub fn new(
        oauth: Arc<dyn OAuthRepository>,
        audit: Arc<AuditRecorder>,
        gate: Arc<AccessGate>,
    ) -> Self {
        Self { oauth, audit, gate }
    }

    /// Registers an app; requires workspace Admin
    #[allow(clippy::too_many_arguments)]
    pub async fn create_app(
        &self,
        principal: &Principal,
        client_ip: Option<&str>,
        workspace_id: WorkspaceId,
        name: &str,
        description: Option<String>,
        client_type: ClientType,
        redirect_uris: Vec<String>,
        allowed_scopes: ScopeSet,
    ) -> Result<CreatedApp, DomainError> {
        self.gate.require_scope(principal, Scope::OAuthAppsWrite)?;
        self.gate.workspace_in_scope(principal, workspace_id).await?;
        self.gate
            .require_workspace_role(principal, workspace_id, WorkspaceRole::Admin)
            .await?;

        for uri in &redirect_uris {
            let parsed = Url::parse(uri).map_err(|_| {
                DomainError::Validation(format!("Invalid redirect_uri: {uri}"))
            })?;
            if parsed.scheme() != "https" && parsed.scheme() != "http" {
                return Err(DomainError::Validation(format!(
                    "redirect_uri must be http(s): {uri}"
                )));
            }
        }

        let client_id = secrets::new_client_id();
        let (secret, secret_hash) = match client_type {
            ClientType::Confidential => {
                let secret = secrets::new_client_secret();
                let hash = secrets::hash_secret(&secret);
                (Some(secret), Some(hash))
            }
            ClientType::Public => (None, None),
        };

        let app = OAuthApp::new(
            workspace_id,
            name,
            description,
            client_type,
            client_id,
            secret_hash,
            redirect_uris,
            allowed_scopes,
            principal.user_id,
        )?;

        let entry = self
            .entry(app.id(), OAuthAppEvent::Created, principal, client_ip)
            .with_details(json!({"name": app.name(), "client_type": app.client_type().to_string()}));
        self.oauth
            .create_app(&app, &entry)
            .await
            .map_err(transient)?;

        info!(app_id = %app.id(), workspace_id = %workspace_id, "OAuth app registered");
        Ok(CreatedApp {
            app,
            client_secret: secret,
        })
    }

    /// Lists a workspace's apps; requires Admin
    pub async fn list_apps(
        &self,
        principal: &Principal,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<OAuthApp>, DomainError> {
        self.gate.require_scope(principal, Scope::OAuthAppsRead)?;
        let result: Result<Vec<OAuthApp>, DomainError> = async {
            self.gate.workspace_in_scope(principal, workspace_id).await?;
            self.gate
                .require_workspace_role(principal, workspace_id, WorkspaceRole::Admin)
                .await?;
            self.oauth.list_apps(workspace_id).await.map_err(transient)
        }
        .await;
        result.map_err(|e| e.masked("workspace"))
    }

    /// Retrieves one app; requires Admin of its workspace
    pub async fn get_app(
        &self,
        principal: &Principal,
        app_id: AppId,
    ) -> Result<OAuthApp, DomainError> {
        self.gate.require_scope(principal, Scope::OAuthAppsRead)?;
        self.admin_visible_app(principal, app_id).await
    }

    /// Updates name/description/redirects/scopes; requires Admin
    #[allow(clippy::too_many_arguments)]
    pub async fn update_app(
        &self,
        principal: &Principal,
        client_ip: Option<&str>,
        app_id: AppId,
        name: &str,
        description: Option<String>,
        redirect_uris: Vec<String>,
        allowed_scopes: ScopeSet,
    ) -> Result<OAuthApp, DomainError> {
        self.gate.require_scope(principal, Scope::OAuthAppsWrite)?;
        let mut app = self.admin_visible_app(principal, app_id).await?;
        app.update(name, description, redirect_uris, allowed_scopes)?;
        let entry = self
            .entry(app_id, OAuthAppEvent::Updated, principal, client_ip)
            .with_details(json!({"name": app.name()}));
        self.oauth
            .update_app(&app, &entry)
            .await
            .map_err(transient)?;
        Ok(app)
    }

    /// Enables or disables an app; requires Admin
    pub async fn set_enabled(
        &self,
        principal: &Principal,
        client_ip: Option<&str>,
        app_id: AppId,
        enabled: bool,
    ) -> Result<OAuthApp, DomainError> {
        self.gate.require_scope(principal, Scope::OAuthAppsWrite)?;
        let mut app = self.admin_visible_app(principal, app_id).await?;
        app.set_enabled(enabled);
        let event = if enabled {
            OAuthAppEvent::Enabled
        } else {
            OAuthAppEvent::Disabled
        };
        let entry = self.entry(app_id, event, principal, client_ip);
        self.oauth
            .update_app(&app, &entry)
            .await
            .map_err(transient)?;
        info!(app_id = %app_id, enabled, "OAuth app enablement changed");
        Ok(app)
    }

    /// Rotates a confidential client's secret; requires the admin scope
    ///
    /// Returns the new secret exactly once.
    pub async fn rotate_secret(
        &self,
        principal: &Principal,
        client_ip: Option<&str>,
        app_id: AppId,
    ) -> Result<String, DomainError> {
        self.gate.require_scope(principal, Scope::OAuthAppsAdmin)?;
        let mut app = self.admin_visible_app(principal, app_id).await?;

        let secret = secrets::new_client_secret();
        app.rotate_secret(secrets::hash_secret(&secret))?;
        let entry = self.entry(app_id, OAuthAppEvent::SecretRotated, principal, client_ip);
        self.oauth
            .update_app(&app, &entry)
            .await
            .map_err(transient)?;
        info!(app_id = %app_id, "OAuth app secret rotated");
        Ok(secret)
    }

    /// Deletes an app and everything it owns; requires the admin scope
    ///
    /// Codes, refresh-token families, and the app's audit log cascade.
    pub async fn delete_app(
        &self,
        principal: &Principal,
        app_id: AppId,
    ) -> Result<(), DomainError> {
        self.gate.require_scope(principal, Scope::OAuthAppsAdmin)?;
        let app = self.admin_visible_app(principal, app_id).await?;
        self.oauth.delete_app(app.id()).await.map_err(transient)?;
        info!(app_id = %app_id, "OAuth app deleted");
        Ok(())
    }

    /// Lists an app's audit entries; requires Admin
    pub async fn audit_log(
        &self,
        principal: &Principal,
        app_id: AppId,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, DomainError> {
        self.gate.require_scope(principal, Scope::OAuthAppsRead)?;
        self.admin_visible_app(principal, app_id).await?;
        self.audit.for_app(app_id, limit).await.map_err(transient)
    }

    /// Loads an app and checks workspace Admin, masked to NotFound
    async fn admin_visible_app(
        &self,
        principal: &Principal,
        app_id: AppId,
    ) -> Result<OAuthApp, DomainError> {
        let result: Result<OAuthApp, DomainError> = async {
            let app = self
                .oauth
                .get_app(app_id)
                .await
                .map_err(transient)?
                .ok_or_else(|| DomainError::NotFound("app".to_string()))?;
            self.gate
                .workspace_in_scope(principal, app.workspace_id())
                .await?;
            self.gate
                .require_workspace_role(principal, app.workspace_id(), WorkspaceRole::Admin)
                .await?;
            Ok(app)
        }
        .await;
        result.map_err(|e| e.masked("app"))
    }

    fn entry(
        &self,
        app_id: AppId,
        event: OAuthAppEvent,
        principal: &Principal,
        client_ip: Option<&str>,
    ) -> AuditEntry {
        let mut entry = AuditEntry::new(AuditSubject::OAuthApp { app_id, event })
            .with_actor(principal.user_id);
        if let Some(ip) = client_ip {
            entry = entry.with_ip(ip);
        }
        entry
    }
}
