//! In-memory identity repository for use-case unit tests
//!
//! Hash-map-backed, coarse-grained locking. Adapter-level behavior
//! (transactions, cascades) is covered by the SQLite store's own tests;
//! this exists so the gate and membership logic can be exercised without
//! a database.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::identity::{
    Project, ProjectMembership, User, Workspace, WorkspaceInvite, WorkspaceMembership,
    WorkspaceRole,
};
use crate::domain::newtypes::{Email, ProjectId, UniqueId, UserId, WorkspaceId};
use crate::ports::IdentityRepository;

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, User>,
    workspaces: HashMap<WorkspaceId, Workspace>,
    projects: HashMap<ProjectId, Project>,
    workspace_members: HashMap<UniqueId, WorkspaceMembership>,
    project_members: HashMap<UniqueId, ProjectMembership>,
    invites: HashMap<UniqueId, WorkspaceInvite>,
}

/// In-memory [`IdentityRepository`]
#[derive(Default)]
pub struct MemoryIdentityRepository {
    inner: Mutex<Inner>,
}

impl MemoryIdentityRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl IdentityRepository for MemoryIdentityRepository {
    async fn create_user(&self, user: &User) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.values().any(|u| u.subject() == user.subject()) {
            anyhow::bail!("subject already exists");
        }
        inner.users.insert(user.id(), user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> anyhow::Result<Option<User>> {
        Ok(self.inner.lock().unwrap().users.get(&id).cloned())
    }

    async fn get_user_by_subject(&self, subject: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .users
            .values()
            .find(|u| u.subject() == subject)
            .cloned())
    }

    async fn update_user(&self, user: &User) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .users
            .insert(user.id(), user.clone());
        Ok(())
    }

    async fn create_workspace(
        &self,
        workspace: &Workspace,
        owner: &WorkspaceMembership,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.workspaces.insert(workspace.id(), workspace.clone());
        inner.workspace_members.insert(owner.id(), owner.clone());
        Ok(())
    }

    async fn get_workspace(&self, id: WorkspaceId) -> anyhow::Result<Option<Workspace>> {
        Ok(self.inner.lock().unwrap().workspaces.get(&id).cloned())
    }

    async fn list_workspaces_for_user(&self, user_id: UserId) -> anyhow::Result<Vec<Workspace>> {
        let inner = self.inner.lock().unwrap();
        let mut result: Vec<Workspace> = inner
            .workspace_members
            .values()
            .filter(|m| m.user_id() == user_id)
            .filter_map(|m| inner.workspaces.get(&m.workspace_id()).cloned())
            .collect();
        result.sort_by_key(|w| std::cmp::Reverse(w.created_at()));
        Ok(result)
    }

    async fn update_workspace(&self, workspace: &Workspace) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .workspaces
            .insert(workspace.id(), workspace.clone());
        Ok(())
    }

    async fn create_project(&self, project: &Project) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .projects
            .insert(project.id(), project.clone());
        Ok(())
    }

    async fn get_project(&self, id: ProjectId) -> anyhow::Result<Option<Project>> {
        Ok(self.inner.lock().unwrap().projects.get(&id).cloned())
    }

    async fn list_projects(&self, workspace_id: WorkspaceId) -> anyhow::Result<Vec<Project>> {
        let mut result: Vec<Project> = self
            .inner
            .lock()
            .unwrap()
            .projects
            .values()
            .filter(|p| p.workspace_id() == workspace_id)
            .cloned()
            .collect();
        result.sort_by_key(|p| std::cmp::Reverse(p.created_at()));
        Ok(result)
    }

    async fn update_project(&self, project: &Project) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .projects
            .insert(project.id(), project.clone());
        Ok(())
    }

    async fn get_workspace_membership(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
    ) -> anyhow::Result<Option<WorkspaceMembership>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .workspace_members
            .values()
            .find(|m| m.workspace_id() == workspace_id && m.user_id() == user_id)
            .cloned())
    }

    async fn list_workspace_members(
        &self,
        workspace_id: WorkspaceId,
    ) -> anyhow::Result<Vec<WorkspaceMembership>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .workspace_members
            .values()
            .filter(|m| m.workspace_id() == workspace_id)
            .cloned()
            .collect())
    }

    async fn save_workspace_membership(
        &self,
        membership: &WorkspaceMembership,
    ) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .workspace_members
            .insert(membership.id(), membership.clone());
        Ok(())
    }

    async fn delete_workspace_membership(&self, id: UniqueId) -> anyhow::Result<()> {
        self.inner.lock().unwrap().workspace_members.remove(&id);
        Ok(())
    }

    async fn count_owners(&self, workspace_id: WorkspaceId) -> anyhow::Result<u64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .workspace_members
            .values()
            .filter(|m| m.workspace_id() == workspace_id && m.role() == WorkspaceRole::Owner)
            .count() as u64)
    }

    async fn get_project_membership(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> anyhow::Result<Option<ProjectMembership>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .project_members
            .values()
            .find(|m| m.project_id() == project_id && m.user_id() == user_id)
            .cloned())
    }

    async fn list_project_members(
        &self,
        project_id: ProjectId,
    ) -> anyhow::Result<Vec<ProjectMembership>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .project_members
            .values()
            .filter(|m| m.project_id() == project_id)
            .cloned()
            .collect())
    }

    async fn save_project_membership(
        &self,
        membership: &ProjectMembership,
    ) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .project_members
            .insert(membership.id(), membership.clone());
        Ok(())
    }

    async fn delete_project_membership(&self, id: UniqueId) -> anyhow::Result<()> {
        self.inner.lock().unwrap().project_members.remove(&id);
        Ok(())
    }

    async fn create_invite(&self, invite: &WorkspaceInvite) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .invites
            .insert(invite.id(), invite.clone());
        Ok(())
    }

    async fn get_invite_by_token(&self, token: &str) -> anyhow::Result<Option<WorkspaceInvite>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .invites
            .values()
            .find(|i| i.token() == token)
            .cloned())
    }

    async fn list_invites(
        &self,
        workspace_id: WorkspaceId,
    ) -> anyhow::Result<Vec<WorkspaceInvite>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .invites
            .values()
            .filter(|i| i.workspace_id() == workspace_id)
            .cloned()
            .collect())
    }

    async fn find_pending_invite(
        &self,
        workspace_id: WorkspaceId,
        email: &Email,
    ) -> anyhow::Result<Option<WorkspaceInvite>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .invites
            .values()
            .find(|i| {
                i.workspace_id() == workspace_id
                    && i.email() == email
                    && i.status() == crate::domain::identity::InviteStatus::Pending
            })
            .cloned())
    }

    async fn update_invite(&self, invite: &WorkspaceInvite) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .invites
            .insert(invite.id(), invite.clone());
        Ok(())
    }
}
