//! SQLite implementation of the identity repository port

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use wexhub_core::domain::identity::{
    Project, ProjectMembership, User, Workspace, WorkspaceInvite, WorkspaceMembership,
};
use wexhub_core::domain::newtypes::{Email, ProjectId, UniqueId, UserId, WorkspaceId};
use wexhub_core::ports::IdentityRepository;

use crate::convert::{
    invite_status_from, parse_datetime, parse_optional_datetime, project_role_from,
    workspace_role_from,
};
use crate::SqliteStore;

fn user_from_row(row: &SqliteRow) -> anyhow::Result<User> {
    let email: Option<String> = row.get("email");
    Ok(User::from_parts(
        row.get::<String, _>("id").parse()?,
        row.get("subject"),
        email.map(Email::new).transpose()?,
        row.get("display_name"),
        parse_datetime(row.get("created_at"))?,
        parse_optional_datetime(row.get("last_login_at"))?,
    ))
}

fn workspace_from_row(row: &SqliteRow) -> anyhow::Result<Workspace> {
    Ok(Workspace::from_parts(
        row.get::<String, _>("id").parse()?,
        row.get("name"),
        row.get("description"),
        parse_datetime(row.get("created_at"))?,
        parse_datetime(row.get("updated_at"))?,
    ))
}

fn project_from_row(row: &SqliteRow) -> anyhow::Result<Project> {
    Ok(Project::from_parts(
        row.get::<String, _>("id").parse()?,
        row.get::<String, _>("workspace_id").parse()?,
        row.get("name"),
        row.get("description"),
        parse_datetime(row.get("created_at"))?,
        parse_datetime(row.get("updated_at"))?,
    ))
}

fn workspace_membership_from_row(row: &SqliteRow) -> anyhow::Result<WorkspaceMembership> {
    Ok(WorkspaceMembership::from_parts(
        row.get::<String, _>("id").parse()?,
        row.get::<String, _>("workspace_id").parse()?,
        row.get::<String, _>("user_id").parse()?,
        workspace_role_from(row.get("role"))?,
        parse_datetime(row.get("created_at"))?,
    ))
}

fn project_membership_from_row(row: &SqliteRow) -> anyhow::Result<ProjectMembership> {
    Ok(ProjectMembership::from_parts(
        row.get::<String, _>("id").parse()?,
        row.get::<String, _>("project_id").parse()?,
        row.get::<String, _>("user_id").parse()?,
        project_role_from(row.get("role"))?,
        parse_datetime(row.get("created_at"))?,
    ))
}

fn invite_from_row(row: &SqliteRow) -> anyhow::Result<WorkspaceInvite> {
    Ok(WorkspaceInvite::from_parts(
        row.get::<String, _>("id").parse()?,
        row.get::<String, _>("workspace_id").parse()?,
        Email::new(row.get::<String, _>("email"))?,
        workspace_role_from(row.get("role"))?,
        row.get("token"),
        invite_status_from(row.get("status"))?,
        row.get::<String, _>("invited_by").parse()?,
        parse_datetime(row.get("created_at"))?,
        parse_datetime(row.get("expires_at"))?,
        parse_optional_datetime(row.get("accepted_at"))?,
    ))
}

#[async_trait::async_trait]
impl IdentityRepository for SqliteStore {
    async fn create_user(&self, user: &User) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO users (id, subject, email, display_name, created_at, last_login_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id().to_string())
        .bind(user.subject())
        .bind(user.email().map(|e| e.as_str().to_string()))
        .bind(user.display_name())
        .bind(user.created_at().to_rfc3339())
        .bind(user.last_login_at().map(|t| t.to_rfc3339()))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> anyhow::Result<Option<User>> {
        sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    async fn get_user_by_subject(&self, subject: &str) -> anyhow::Result<Option<User>> {
        sqlx::query("SELECT * FROM users WHERE subject = ?")
            .bind(subject)
            .fetch_optional(self.pool())
            .await?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    async fn update_user(&self, user: &User) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET email = ?, display_name = ?, last_login_at = ? WHERE id = ?",
        )
        .bind(user.email().map(|e| e.as_str().to_string()))
        .bind(user.display_name())
        .bind(user.last_login_at().map(|t| t.to_rfc3339()))
        .bind(user.id().to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn create_workspace(
        &self,
        workspace: &Workspace,
        owner: &WorkspaceMembership,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "INSERT INTO workspaces (id, name, description, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(workspace.id().to_string())
        .bind(workspace.name())
        .bind(workspace.description())
        .bind(workspace.created_at().to_rfc3339())
        .bind(workspace.updated_at().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO workspace_members (id, workspace_id, user_id, role, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(owner.id().to_string())
        .bind(owner.workspace_id().to_string())
        .bind(owner.user_id().to_string())
        .bind(owner.role().to_string())
        .bind(owner.created_at().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_workspace(&self, id: WorkspaceId) -> anyhow::Result<Option<Workspace>> {
        sqlx::query("SELECT * FROM workspaces WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?
            .map(|row| workspace_from_row(&row))
            .transpose()
    }

    async fn list_workspaces_for_user(&self, user_id: UserId) -> anyhow::Result<Vec<Workspace>> {
        let rows = sqlx::query(
            "SELECT w.* FROM workspaces w \
             JOIN workspace_members m ON m.workspace_id = w.id \
             WHERE m.user_id = ? ORDER BY w.created_at DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(workspace_from_row).collect()
    }

    async fn update_workspace(&self, workspace: &Workspace) -> anyhow::Result<()> {
        sqlx::query("UPDATE workspaces SET name = ?, description = ?, updated_at = ? WHERE id = ?")
            .bind(workspace.name())
            .bind(workspace.description())
            .bind(workspace.updated_at().to_rfc3339())
            .bind(workspace.id().to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn create_project(&self, project: &Project) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO projects (id, workspace_id, name, description, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(project.id().to_string())
        .bind(project.workspace_id().to_string())
        .bind(project.name())
        .bind(project.description())
        .bind(project.created_at().to_rfc3339())
        .bind(project.updated_at().to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_project(&self, id: ProjectId) -> anyhow::Result<Option<Project>> {
        sqlx::query("SELECT * FROM projects WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?
            .map(|row| project_from_row(&row))
            .transpose()
    }

    async fn list_projects(&self, workspace_id: WorkspaceId) -> anyhow::Result<Vec<Project>> {
        let rows =
            sqlx::query("SELECT * FROM projects WHERE workspace_id = ? ORDER BY created_at DESC")
                .bind(workspace_id.to_string())
                .fetch_all(self.pool())
                .await?;
        rows.iter().map(project_from_row).collect()
    }

    async fn update_project(&self, project: &Project) -> anyhow::Result<()> {
        sqlx::query("UPDATE projects SET name = ?, description = ?, updated_at = ? WHERE id = ?")
            .bind(project.name())
            .bind(project.description())
            .bind(project.updated_at().to_rfc3339())
            .bind(project.id().to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn get_workspace_membership(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
    ) -> anyhow::Result<Option<WorkspaceMembership>> {
        sqlx::query("SELECT * FROM workspace_members WHERE workspace_id = ? AND user_id = ?")
            .bind(workspace_id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(self.pool())
            .await?
            .map(|row| workspace_membership_from_row(&row))
            .transpose()
    }

    async fn list_workspace_members(
        &self,
        workspace_id: WorkspaceId,
    ) -> anyhow::Result<Vec<WorkspaceMembership>> {
        let rows = sqlx::query(
            "SELECT * FROM workspace_members WHERE workspace_id = ? ORDER BY created_at ASC",
        )
        .bind(workspace_id.to_string())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(workspace_membership_from_row).collect()
    }

    async fn save_workspace_membership(
        &self,
        membership: &WorkspaceMembership,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO workspace_members (id, workspace_id, user_id, role, created_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (workspace_id, user_id) DO UPDATE SET role = excluded.role",
        )
        .bind(membership.id().to_string())
        .bind(membership.workspace_id().to_string())
        .bind(membership.user_id().to_string())
        .bind(membership.role().to_string())
        .bind(membership.created_at().to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn delete_workspace_membership(&self, id: UniqueId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM workspace_members WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn count_owners(&self, workspace_id: WorkspaceId) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM workspace_members WHERE workspace_id = ? AND role = 'owner'",
        )
        .bind(workspace_id.to_string())
        .fetch_one(self.pool())
        .await?;
        Ok(count as u64)
    }

    async fn get_project_membership(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> anyhow::Result<Option<ProjectMembership>> {
        sqlx::query("SELECT * FROM project_members WHERE project_id = ? AND user_id = ?")
            .bind(project_id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(self.pool())
            .await?
            .map(|row| project_membership_from_row(&row))
            .transpose()
    }

    async fn list_project_members(
        &self,
        project_id: ProjectId,
    ) -> anyhow::Result<Vec<ProjectMembership>> {
        let rows = sqlx::query(
            "SELECT * FROM project_members WHERE project_id = ? ORDER BY created_at ASC",
        )
        .bind(project_id.to_string())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(project_membership_from_row).collect()
    }

    async fn save_project_membership(
        &self,
        membership: &ProjectMembership,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO project_members (id, project_id, user_id, role, created_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (project_id, user_id) DO UPDATE SET role = excluded.role",
        )
        .bind(membership.id().to_string())
        .bind(membership.project_id().to_string())
        .bind(membership.user_id().to_string())
        .bind(membership.role().to_string())
        .bind(membership.created_at().to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn delete_project_membership(&self, id: UniqueId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM project_members WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn create_invite(&self, invite: &WorkspaceInvite) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO workspace_invites \
             (id, workspace_id, email, role, token, status, invited_by, created_at, expires_at, accepted_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(invite.id().to_string())
        .bind(invite.workspace_id().to_string())
        .bind(invite.email().as_str())
        .bind(invite.role().to_string())
        .bind(invite.token())
        .bind(invite.status().to_string())
        .bind(invite.invited_by().to_string())
        .bind(invite.created_at().to_rfc3339())
        .bind(invite.expires_at().to_rfc3339())
        .bind(invite.accepted_at().map(|t| t.to_rfc3339()))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_invite_by_token(&self, token: &str) -> anyhow::Result<Option<WorkspaceInvite>> {
        sqlx::query("SELECT * FROM workspace_invites WHERE token = ?")
            .bind(token)
            .fetch_optional(self.pool())
            .await?
            .map(|row| invite_from_row(&row))
            .transpose()
    }

    async fn list_invites(
        &self,
        workspace_id: WorkspaceId,
    ) -> anyhow::Result<Vec<WorkspaceInvite>> {
        let rows = sqlx::query(
            "SELECT * FROM workspace_invites WHERE workspace_id = ? ORDER BY created_at DESC",
        )
        .bind(workspace_id.to_string())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(invite_from_row).collect()
    }

    async fn find_pending_invite(
        &self,
        workspace_id: WorkspaceId,
        email: &Email,
    ) -> anyhow::Result<Option<WorkspaceInvite>> {
        sqlx::query(
            "SELECT * FROM workspace_invites \
             WHERE workspace_id = ? AND email = ? AND status = 'pending'",
        )
        .bind(workspace_id.to_string())
        .bind(email.as_str())
        .fetch_optional(self.pool())
        .await?
        .map(|row| invite_from_row(&row))
        .transpose()
    }

    async fn update_invite(&self, invite: &WorkspaceInvite) -> anyhow::Result<()> {
        sqlx::query("UPDATE workspace_invites SET status = ?, accepted_at = ? WHERE id = ?")
            .bind(invite.status().to_string())
            .bind(invite.accepted_at().map(|t| t.to_rfc3339()))
            .bind(invite.id().to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
