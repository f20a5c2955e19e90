//! Project management use cases

use std::sync::Arc;

use tracing::info;

use crate::domain::errors::DomainError;
use crate::domain::identity::{
    Project, ProjectMembership, ProjectRole, WorkspaceRole,
};
use crate::domain::newtypes::{ProjectId, UserId, WorkspaceId};
use crate::domain::scope::{Principal, Scope};
use crate::ports::IdentityRepository;

use super::access::AccessGate;

fn transient(e: anyhow::Error) -> DomainError {
    DomainError::Transient(e.to_string())
}

/// Use case for project lifecycle and project membership administration
pub struct ProjectService {
    identity: Arc<dyn IdentityRepository>,
    gate: Arc<AccessGate>,
}

impl ProjectService {
    pub fn new(identity: Arc<dyn IdentityRepository>, gate: Arc<AccessGate>) -> Self {
        Self { identity, gate }
    }

    /// Creates a project; requires workspace Member or better
    pub async fn create_project(
        &self,
        principal: &Principal,
        workspace_id: WorkspaceId,
        name: &str,
        description: Option<String>,
    ) -> Result<Project, DomainError> {
        self.gate.require_scope(principal, Scope::ProjectsWrite)?;
        self.gate.workspace_in_scope(principal, workspace_id).await?;
        self.gate
            .require_workspace_role(principal, workspace_id, WorkspaceRole::Member)
            .await?;

        let project = Project::new(workspace_id, name, description)?;
        self.identity
            .create_project(&project)
            .await
            .map_err(transient)?;
        info!(project_id = %project.id(), workspace_id = %workspace_id, "Project created");
        Ok(project)
    }

    /// Lists a workspace's projects; requires membership
    pub async fn list_projects(
        &self,
        principal: &Principal,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<Project>, DomainError> {
        self.gate.require_scope(principal, Scope::ProjectsRead)?;
        let result: Result<Vec<Project>, DomainError> = async {
            self.gate.workspace_in_scope(principal, workspace_id).await?;
            self.gate
                .require_workspace_role(principal, workspace_id, WorkspaceRole::Guest)
                .await?;
            self.identity
                .list_projects(workspace_id)
                .await
                .map_err(transient)
        }
        .await;
        result.map_err(|e| e.masked("workspace"))
    }

    /// Retrieves a project the caller can see
    pub async fn get_project(
        &self,
        principal: &Principal,
        project_id: ProjectId,
    ) -> Result<Project, DomainError> {
        self.gate.require_scope(principal, Scope::ProjectsRead)?;
        let result: Result<Project, DomainError> = async {
            let project = self.gate.project_in_scope(principal, project_id).await?;
            self.gate
                .require_project_role(principal, &project, ProjectRole::Viewer)
                .await?;
            Ok(project)
        }
        .await;
        result.map_err(|e| e.masked("project"))
    }

    /// Renames a project; requires ProjectAdmin
    pub async fn update_project(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        name: &str,
        description: Option<String>,
    ) -> Result<Project, DomainError> {
        self.gate.require_scope(principal, Scope::ProjectsWrite)?;
        let mut project = self.gate.project_in_scope(principal, project_id).await?;
        self.gate
            .require_project_role(principal, &project, ProjectRole::ProjectAdmin)
            .await?;

        project.rename(name, description)?;
        self.identity
            .update_project(&project)
            .await
            .map_err(transient)?;
        Ok(project)
    }

    // ========================================================================
    // Project memberships
    // ========================================================================

    /// Lists a project's explicit memberships; requires Viewer
    pub async fn list_members(
        &self,
        principal: &Principal,
        project_id: ProjectId,
    ) -> Result<Vec<ProjectMembership>, DomainError> {
        self.gate.require_scope(principal, Scope::ProjectsRead)?;
        let result: Result<Vec<ProjectMembership>, DomainError> = async {
            let project = self.gate.project_in_scope(principal, project_id).await?;
            self.gate
                .require_project_role(principal, &project, ProjectRole::Viewer)
                .await?;
            self.identity
                .list_project_members(project_id)
                .await
                .map_err(transient)
        }
        .await;
        result.map_err(|e| e.masked("project"))
    }

    /// Grants or changes a user's explicit project role; requires
    /// ProjectAdmin. The target must be a member of the owning workspace.
    pub async fn set_member_role(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        target_user: UserId,
        role: ProjectRole,
    ) -> Result<ProjectMembership, DomainError> {
        self.gate.require_scope(principal, Scope::ProjectsWrite)?;
        let project = self.gate.project_in_scope(principal, project_id).await?;
        self.gate
            .require_project_role(principal, &project, ProjectRole::ProjectAdmin)
            .await?;

        if self
            .identity
            .get_workspace_membership(project.workspace_id(), target_user)
            .await
            .map_err(transient)?
            .is_none()
        {
            return Err(DomainError::Validation(
                "The user is not a member of the owning workspace".to_string(),
            ));
        }

        let membership = match self
            .identity
            .get_project_membership(project_id, target_user)
            .await
            .map_err(transient)?
        {
            Some(mut existing) => {
                existing.set_role(role);
                existing
            }
            None => ProjectMembership::new(project_id, target_user, role),
        };
        self.identity
            .save_project_membership(&membership)
            .await
            .map_err(transient)?;
        Ok(membership)
    }

    /// Removes a user's explicit project membership; requires ProjectAdmin
    ///
    /// The user falls back to whatever their workspace role derives.
    pub async fn remove_member(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        target_user: UserId,
    ) -> Result<(), DomainError> {
        self.gate.require_scope(principal, Scope::ProjectsWrite)?;
        let project = self.gate.project_in_scope(principal, project_id).await?;
        self.gate
            .require_project_role(principal, &project, ProjectRole::ProjectAdmin)
            .await?;

        let membership = self
            .identity
            .get_project_membership(project_id, target_user)
            .await
            .map_err(transient)?
            .ok_or_else(|| DomainError::NotFound("membership".to_string()))?;
        self.identity
            .delete_project_membership(membership.id())
            .await
            .map_err(transient)?;
        Ok(())
    }
}
