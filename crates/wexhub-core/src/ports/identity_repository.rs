//! Identity repository port (driven/secondary port)
//!
//! Persistence for users, workspaces, projects, memberships, and invites.
//! Uses `anyhow::Result` at the boundary; the use-case layer classifies
//! failures into the domain taxonomy where needed.

use crate::domain::identity::{
    Project, ProjectMembership, User, Workspace, WorkspaceInvite, WorkspaceMembership,
};
use crate::domain::newtypes::{Email, ProjectId, UniqueId, UserId, WorkspaceId};

/// Port trait for identity persistence
#[async_trait::async_trait]
pub trait IdentityRepository: Send + Sync {
    // --- User operations ---

    /// Inserts a new user; the subject must be unique
    async fn create_user(&self, user: &User) -> anyhow::Result<()>;

    /// Retrieves a user by id
    async fn get_user(&self, id: UserId) -> anyhow::Result<Option<User>>;

    /// Retrieves a user by external subject
    async fn get_user_by_subject(&self, subject: &str) -> anyhow::Result<Option<User>>;

    /// Updates a user (email, display name, last login)
    async fn update_user(&self, user: &User) -> anyhow::Result<()>;

    // --- Workspace operations ---

    /// Inserts a workspace together with its founding Owner membership,
    /// atomically, so the at-least-one-Owner invariant holds from birth
    async fn create_workspace(
        &self,
        workspace: &Workspace,
        owner: &WorkspaceMembership,
    ) -> anyhow::Result<()>;

    /// Retrieves a workspace by id
    async fn get_workspace(&self, id: WorkspaceId) -> anyhow::Result<Option<Workspace>>;

    /// Lists the workspaces a user is a member of, newest first
    async fn list_workspaces_for_user(&self, user_id: UserId) -> anyhow::Result<Vec<Workspace>>;

    /// Updates a workspace's name/description
    async fn update_workspace(&self, workspace: &Workspace) -> anyhow::Result<()>;

    // --- Project operations ---

    /// Inserts a project
    async fn create_project(&self, project: &Project) -> anyhow::Result<()>;

    /// Retrieves a project by id
    async fn get_project(&self, id: ProjectId) -> anyhow::Result<Option<Project>>;

    /// Lists a workspace's projects, newest first
    async fn list_projects(&self, workspace_id: WorkspaceId) -> anyhow::Result<Vec<Project>>;

    /// Updates a project's name/description
    async fn update_project(&self, project: &Project) -> anyhow::Result<()>;

    // --- Workspace membership operations ---

    /// Retrieves the membership of `user_id` in `workspace_id`, if any
    async fn get_workspace_membership(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
    ) -> anyhow::Result<Option<WorkspaceMembership>>;

    /// Lists all memberships of a workspace
    async fn list_workspace_members(
        &self,
        workspace_id: WorkspaceId,
    ) -> anyhow::Result<Vec<WorkspaceMembership>>;

    /// Inserts or updates a membership (unique per workspace+user)
    async fn save_workspace_membership(
        &self,
        membership: &WorkspaceMembership,
    ) -> anyhow::Result<()>;

    /// Deletes a membership row
    async fn delete_workspace_membership(&self, id: UniqueId) -> anyhow::Result<()>;

    /// Counts members with role Owner in a workspace
    async fn count_owners(&self, workspace_id: WorkspaceId) -> anyhow::Result<u64>;

    // --- Project membership operations ---

    /// Retrieves the explicit project membership of a user, if any
    async fn get_project_membership(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> anyhow::Result<Option<ProjectMembership>>;

    /// Lists all explicit memberships of a project
    async fn list_project_members(
        &self,
        project_id: ProjectId,
    ) -> anyhow::Result<Vec<ProjectMembership>>;

    /// Inserts or updates a project membership (unique per project+user)
    async fn save_project_membership(&self, membership: &ProjectMembership)
        -> anyhow::Result<()>;

    /// Deletes a project membership row
    async fn delete_project_membership(&self, id: UniqueId) -> anyhow::Result<()>;

    // --- Invite operations ---

    /// Inserts an invite
    async fn create_invite(&self, invite: &WorkspaceInvite) -> anyhow::Result<()>;

    /// Retrieves an invite by its acceptance token
    async fn get_invite_by_token(&self, token: &str) -> anyhow::Result<Option<WorkspaceInvite>>;

    /// Lists a workspace's invites, newest first
    async fn list_invites(&self, workspace_id: WorkspaceId)
        -> anyhow::Result<Vec<WorkspaceInvite>>;

    /// Finds a pending invite for an email in a workspace, if any
    async fn find_pending_invite(
        &self,
        workspace_id: WorkspaceId,
        email: &Email,
    ) -> anyhow::Result<Option<WorkspaceInvite>>;

    /// Updates an invite's status fields
    async fn update_invite(&self, invite: &WorkspaceInvite) -> anyhow::Result<()>;
}
