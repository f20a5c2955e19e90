//! Scope and isolation gate
//!
//! Runs before any domain logic: (1) the endpoint's required scope must be
//! present on the principal, (2) a workspace-bound token (`tid`) may only
//! touch its own workspace, (3) project-scoped paths resolve the project's
//! workspace and compare it against the binding. Role requirements resolve
//! through the Workspace→Project hierarchy.
//!
//! Violations are `Authorization`; existence-sensitive readers mask them
//! to `NotFound` via [`DomainError::masked`] so callers cannot probe for
//! resources they cannot see.

use std::sync::Arc;

use crate::domain::errors::DomainError;
use crate::domain::identity::{
    effective_project_role, Project, ProjectRole, Workspace, WorkspaceMembership, WorkspaceRole,
};
use crate::domain::newtypes::{ProjectId, WorkspaceId};
use crate::domain::scope::{Principal, Scope};
use crate::ports::IdentityRepository;

/// Gate checked on every authenticated request
pub struct AccessGate {
    identity: Arc<dyn IdentityRepository>,
}

impl AccessGate {
    pub fn new(identity: Arc<dyn IdentityRepository>) -> Self {
        Self { identity }
    }

    /// Requires `scope` on the principal
    pub fn require_scope(&self, principal: &Principal, scope: Scope) -> Result<(), DomainError> {
        if principal.scopes.contains(scope) {
            Ok(())
        } else {
            Err(DomainError::Authorization(format!(
                "Missing required scope {scope}"
            )))
        }
    }

    /// Resolves a workspace-scoped path segment, enforcing the binding
    pub async fn workspace_in_scope(
        &self,
        principal: &Principal,
        workspace_id: WorkspaceId,
    ) -> Result<Workspace, DomainError> {
        if !principal.is_bound_to(workspace_id) {
            return Err(DomainError::Authorization(
                "Token is bound to a different workspace".to_string(),
            ));
        }
        self.identity
            .get_workspace(workspace_id)
            .await
            .map_err(|e| DomainError::Transient(e.to_string()))?
            .ok_or_else(|| DomainError::NotFound("workspace".to_string()))
    }

    /// Resolves a project-scoped path segment, enforcing the binding
    /// against the project's owning workspace
    pub async fn project_in_scope(
        &self,
        principal: &Principal,
        project_id: ProjectId,
    ) -> Result<Project, DomainError> {
        let project = self
            .identity
            .get_project(project_id)
            .await
            .map_err(|e| DomainError::Transient(e.to_string()))?
            .ok_or_else(|| DomainError::NotFound("project".to_string()))?;
        if !principal.is_bound_to(project.workspace_id()) {
            return Err(DomainError::Authorization(
                "Token is bound to a different workspace".to_string(),
            ));
        }
        Ok(project)
    }

    /// Looks up the caller's workspace membership, if any
    pub async fn workspace_membership(
        &self,
        principal: &Principal,
        workspace_id: WorkspaceId,
    ) -> Result<Option<WorkspaceMembership>, DomainError> {
        self.identity
            .get_workspace_membership(workspace_id, principal.user_id)
            .await
            .map_err(|e| DomainError::Transient(e.to_string()))
    }

    /// Requires at least `role` in the workspace
    ///
    /// No membership at all is `NotFound` (the caller cannot see the
    /// workspace); an insufficient role is `Authorization`.
    pub async fn require_workspace_role(
        &self,
        principal: &Principal,
        workspace_id: WorkspaceId,
        role: WorkspaceRole,
    ) -> Result<WorkspaceMembership, DomainError> {
        let membership = self
            .workspace_membership(principal, workspace_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("workspace".to_string()))?;
        if membership.role().at_least(role) {
            Ok(membership)
        } else {
            Err(DomainError::Authorization(format!(
                "Workspace role {role} required"
            )))
        }
    }

    /// Resolves the caller's effective role on a project
    pub async fn effective_role(
        &self,
        principal: &Principal,
        project: &Project,
    ) -> Result<Option<ProjectRole>, DomainError> {
        let project_role = self
            .identity
            .get_project_membership(project.id(), principal.user_id)
            .await
            .map_err(|e| DomainError::Transient(e.to_string()))?
            .map(|m| m.role());
        let workspace_role = self
            .workspace_membership(principal, project.workspace_id())
            .await?
            .map(|m| m.role());
        Ok(effective_project_role(project_role, workspace_role))
    }

    /// Requires at least `role` on the project
    ///
    /// No effective role is `NotFound`; an insufficient one is
    /// `Authorization`.
    pub async fn require_project_role(
        &self,
        principal: &Principal,
        project: &Project,
        role: ProjectRole,
    ) -> Result<ProjectRole, DomainError> {
        let effective = self
            .effective_role(principal, project)
            .await?
            .ok_or_else(|| DomainError::NotFound("project".to_string()))?;
        if effective.at_least(role) {
            Ok(effective)
        } else {
            Err(DomainError::Authorization(format!(
                "Project role {role} required"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scope::ScopeSet;
    use crate::usecases::testing::MemoryIdentityRepository;

    use crate::domain::identity::{ProjectMembership, User};
    use crate::domain::newtypes::UserId;

    fn principal(user_id: UserId, workspace: Option<WorkspaceId>, scopes: &str) -> Principal {
        Principal {
            user_id,
            subject: format!("sub-{user_id}"),
            workspace,
            scopes: ScopeSet::parse(scopes).unwrap(),
        }
    }

    async fn setup() -> (Arc<MemoryIdentityRepository>, Workspace, Project, User) {
        let repo = Arc::new(MemoryIdentityRepository::new());
        let user = User::new("sub-owner", "Owner");
        repo.create_user(&user).await.unwrap();
        let workspace = Workspace::new("W", None).unwrap();
        let owner =
            WorkspaceMembership::new(workspace.id(), user.id(), WorkspaceRole::Owner);
        repo.create_workspace(&workspace, &owner).await.unwrap();
        let project = Project::new(workspace.id(), "P", None).unwrap();
        repo.create_project(&project).await.unwrap();
        (repo, workspace, project, user)
    }

    #[tokio::test]
    async fn test_scope_check() {
        let (repo, _, _, user) = setup().await;
        let gate = AccessGate::new(repo);
        let p = principal(user.id(), None, "files:read");
        assert!(gate.require_scope(&p, Scope::FilesRead).is_ok());
        assert!(matches!(
            gate.require_scope(&p, Scope::FilesWrite),
            Err(DomainError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn test_workspace_binding_enforced() {
        let (repo, workspace, project, user) = setup().await;
        let gate = AccessGate::new(repo);

        let bound = principal(user.id(), Some(workspace.id()), "files:read");
        assert!(gate.project_in_scope(&bound, project.id()).await.is_ok());

        let foreign = principal(user.id(), Some(WorkspaceId::new()), "files:read");
        assert!(matches!(
            gate.project_in_scope(&foreign, project.id()).await,
            Err(DomainError::Authorization(_))
        ));

        let unbound = principal(user.id(), None, "files:read");
        assert!(gate.project_in_scope(&unbound, project.id()).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_project_is_not_found() {
        let (repo, _, _, user) = setup().await;
        let gate = AccessGate::new(repo);
        let p = principal(user.id(), None, "files:read");
        assert!(matches!(
            gate.project_in_scope(&p, ProjectId::new()).await,
            Err(DomainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_owner_derives_project_admin() {
        let (repo, _, project, user) = setup().await;
        let gate = AccessGate::new(repo);
        let p = principal(user.id(), None, "files:read");
        let role = gate
            .require_project_role(&p, &project, ProjectRole::ProjectAdmin)
            .await
            .unwrap();
        assert_eq!(role, ProjectRole::ProjectAdmin);
    }

    #[tokio::test]
    async fn test_stranger_gets_not_found() {
        let (repo, _, project, _) = setup().await;
        let stranger = User::new("sub-stranger", "Stranger");
        repo.create_user(&stranger).await.unwrap();
        let gate = AccessGate::new(repo);
        let p = principal(stranger.id(), None, "files:read");
        assert!(matches!(
            gate.require_project_role(&p, &project, ProjectRole::Viewer).await,
            Err(DomainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_explicit_viewer_blocks_writes() {
        let (repo, workspace, project, _) = setup().await;
        let viewer = User::new("sub-viewer", "Viewer");
        repo.create_user(&viewer).await.unwrap();
        repo.save_workspace_membership(&WorkspaceMembership::new(
            workspace.id(),
            viewer.id(),
            WorkspaceRole::Member,
        ))
        .await
        .unwrap();
        repo.save_project_membership(&ProjectMembership::new(
            project.id(),
            viewer.id(),
            ProjectRole::Viewer,
        ))
        .await
        .unwrap();

        let gate = AccessGate::new(repo);
        let p = principal(viewer.id(), None, "files:write");
        assert!(gate
            .require_project_role(&p, &project, ProjectRole::Viewer)
            .await
            .is_ok());
        assert!(matches!(
            gate.require_project_role(&p, &project, ProjectRole::Editor).await,
            Err(DomainError::Authorization(_))
        ));
    }
}
