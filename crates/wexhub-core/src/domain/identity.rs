//! Identity entities: users, workspaces, projects, memberships, invites
//!
//! Role resolution over the Workspace→Project hierarchy lives here as pure
//! functions; the membership use cases enforce the write-side invariants
//! (unique membership per user, last-Owner protection).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{Email, ProjectId, UniqueId, UserId, WorkspaceId};

// ============================================================================
// Roles
// ============================================================================

/// Role of a user inside a workspace
///
/// The derive order matters: `Guest < Member < Admin < Owner`, used for
/// "at least X" checks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceRole {
    Guest,
    Member,
    Admin,
    Owner,
}

impl WorkspaceRole {
    /// Returns true if this role is at least as privileged as `other`
    pub fn at_least(&self, other: WorkspaceRole) -> bool {
        *self >= other
    }
}

impl std::fmt::Display for WorkspaceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkspaceRole::Guest => "guest",
            WorkspaceRole::Member => "member",
            WorkspaceRole::Admin => "admin",
            WorkspaceRole::Owner => "owner",
        };
        write!(f, "{s}")
    }
}

/// Role of a user inside a project; `Viewer < Editor < ProjectAdmin`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ProjectRole {
    Viewer,
    Editor,
    ProjectAdmin,
}

impl ProjectRole {
    /// Returns true if this role is at least as privileged as `other`
    pub fn at_least(&self, other: ProjectRole) -> bool {
        *self >= other
    }
}

impl std::fmt::Display for ProjectRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProjectRole::Viewer => "viewer",
            ProjectRole::Editor => "editor",
            ProjectRole::ProjectAdmin => "project_admin",
        };
        write!(f, "{s}")
    }
}

/// Resolves the effective project role for a user
///
/// 1. An explicit project membership wins.
/// 2. Otherwise the workspace role derives one: Owner/Admin ⇒ ProjectAdmin,
///    Member ⇒ Viewer, Guest ⇒ no access.
/// 3. No workspace membership ⇒ no access.
pub fn effective_project_role(
    project_role: Option<ProjectRole>,
    workspace_role: Option<WorkspaceRole>,
) -> Option<ProjectRole> {
    if let Some(role) = project_role {
        return Some(role);
    }
    match workspace_role? {
        WorkspaceRole::Owner | WorkspaceRole::Admin => Some(ProjectRole::ProjectAdmin),
        WorkspaceRole::Member => Some(ProjectRole::Viewer),
        WorkspaceRole::Guest => None,
    }
}

// ============================================================================
// User
// ============================================================================

/// A registered user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    id: UserId,
    /// Opaque external identity string, unique across users
    subject: String,
    email: Option<Email>,
    display_name: String,
    created_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Creates a new user from an external subject
    pub fn new(subject: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            subject: subject.into(),
            email: None,
            display_name: display_name.into(),
            created_at: Utc::now(),
            last_login_at: None,
        }
    }

    /// Reconstitutes a user from stored fields
    pub fn from_parts(
        id: UserId,
        subject: String,
        email: Option<Email>,
        display_name: String,
        created_at: DateTime<Utc>,
        last_login_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            subject,
            email,
            display_name,
            created_at,
            last_login_at,
        }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn email(&self) -> Option<&Email> {
        self.email.as_ref()
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_login_at(&self) -> Option<DateTime<Utc>> {
        self.last_login_at
    }

    /// Sets the email address
    pub fn set_email(&mut self, email: Email) {
        self.email = Some(email);
    }

    /// Records a login at the current instant
    pub fn record_login(&mut self) {
        self.last_login_at = Some(Utc::now());
    }
}

// ============================================================================
// Workspace
// ============================================================================

/// Top-level multi-tenant container; every resource belongs to exactly one
///
/// Invariant: a workspace always has at least one member with role Owner
/// after creation. The invariant is enforced by the membership use case,
/// not here, because it spans rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    id: WorkspaceId,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Workspace {
    /// Creates a workspace, validating the name
    pub fn new(name: impl Into<String>, description: Option<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::Validation(
                "Workspace name must not be empty".to_string(),
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: WorkspaceId::new(),
            name,
            description,
            created_at: now,
            updated_at: now,
        })
    }

    /// Reconstitutes a workspace from stored fields
    pub fn from_parts(
        id: WorkspaceId,
        name: String,
        description: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            description,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> WorkspaceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Renames the workspace and bumps `updated_at`
    pub fn rename(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<(), DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::Validation(
                "Workspace name must not be empty".to_string(),
            ));
        }
        self.name = name;
        self.description = description;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// A user's membership in a workspace; unique per (workspace, user)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceMembership {
    id: UniqueId,
    workspace_id: WorkspaceId,
    user_id: UserId,
    role: WorkspaceRole,
    created_at: DateTime<Utc>,
}

impl WorkspaceMembership {
    pub fn new(workspace_id: WorkspaceId, user_id: UserId, role: WorkspaceRole) -> Self {
        Self {
            id: UniqueId::new(),
            workspace_id,
            user_id,
            role,
            created_at: Utc::now(),
        }
    }

    pub fn from_parts(
        id: UniqueId,
        workspace_id: WorkspaceId,
        user_id: UserId,
        role: WorkspaceRole,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            workspace_id,
            user_id,
            role,
            created_at,
        }
    }

    pub fn id(&self) -> UniqueId {
        self.id
    }

    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn role(&self) -> WorkspaceRole {
        self.role
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Changes the member's role
    pub fn set_role(&mut self, role: WorkspaceRole) {
        self.role = role;
    }
}

// ============================================================================
// Project
// ============================================================================

/// A workspace child; the unit of file ownership and access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    id: ProjectId,
    workspace_id: WorkspaceId,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(
        workspace_id: WorkspaceId,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::Validation(
                "Project name must not be empty".to_string(),
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: ProjectId::new(),
            workspace_id,
            name,
            description,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn from_parts(
        id: ProjectId,
        workspace_id: WorkspaceId,
        name: String,
        description: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            workspace_id,
            name,
            description,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> ProjectId {
        self.id
    }

    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn rename(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<(), DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::Validation(
                "Project name must not be empty".to_string(),
            ));
        }
        self.name = name;
        self.description = description;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// A user's explicit membership in a project; unique per (project, user)
///
/// May be absent, in which case the effective role derives from the
/// workspace role (see [`effective_project_role`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMembership {
    id: UniqueId,
    project_id: ProjectId,
    user_id: UserId,
    role: ProjectRole,
    created_at: DateTime<Utc>,
}

impl ProjectMembership {
    pub fn new(project_id: ProjectId, user_id: UserId, role: ProjectRole) -> Self {
        Self {
            id: UniqueId::new(),
            project_id,
            user_id,
            role,
            created_at: Utc::now(),
        }
    }

    pub fn from_parts(
        id: UniqueId,
        project_id: ProjectId,
        user_id: UserId,
        role: ProjectRole,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            project_id,
            user_id,
            role,
            created_at,
        }
    }

    pub fn id(&self) -> UniqueId {
        self.id
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn role(&self) -> ProjectRole {
        self.role
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn set_role(&mut self, role: ProjectRole) {
        self.role = role;
    }
}

// ============================================================================
// Workspace invites
// ============================================================================

/// Lifecycle of a workspace invitation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Revoked,
    Expired,
}

impl std::fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Revoked => "revoked",
            InviteStatus::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// Invite lifetime before it expires
const INVITE_TTL_DAYS: i64 = 7;

/// An invitation for an email address to join a workspace
///
/// Acceptance is one-shot: the token resolves the invite, membership is
/// created at the invited role, and the invite transitions to Accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInvite {
    id: UniqueId,
    workspace_id: WorkspaceId,
    email: Email,
    role: WorkspaceRole,
    /// Opaque acceptance token, unique across invites
    token: String,
    status: InviteStatus,
    invited_by: UserId,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
}

impl WorkspaceInvite {
    pub fn new(
        workspace_id: WorkspaceId,
        email: Email,
        role: WorkspaceRole,
        token: String,
        invited_by: UserId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: UniqueId::new(),
            workspace_id,
            email,
            role,
            token,
            status: InviteStatus::Pending,
            invited_by,
            created_at: now,
            expires_at: now + chrono::Duration::days(INVITE_TTL_DAYS),
            accepted_at: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: UniqueId,
        workspace_id: WorkspaceId,
        email: Email,
        role: WorkspaceRole,
        token: String,
        status: InviteStatus,
        invited_by: UserId,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        accepted_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            workspace_id,
            email,
            role,
            token,
            status,
            invited_by,
            created_at,
            expires_at,
            accepted_at,
        }
    }

    pub fn id(&self) -> UniqueId {
        self.id
    }

    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn role(&self) -> WorkspaceRole {
        self.role
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn status(&self) -> InviteStatus {
        self.status
    }

    pub fn invited_by(&self) -> UserId {
        self.invited_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn accepted_at(&self) -> Option<DateTime<Utc>> {
        self.accepted_at
    }

    /// Returns true once the expiry instant has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Accepts a pending, unexpired invite
    pub fn accept(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != InviteStatus::Pending {
            return Err(DomainError::invalid_state(
                self.status.to_string(),
                InviteStatus::Accepted.to_string(),
            ));
        }
        if self.is_expired(now) {
            self.status = InviteStatus::Expired;
            return Err(DomainError::invalid_state(
                InviteStatus::Expired.to_string(),
                InviteStatus::Accepted.to_string(),
            ));
        }
        self.status = InviteStatus::Accepted;
        self.accepted_at = Some(now);
        Ok(())
    }

    /// Revokes a pending invite
    pub fn revoke(&mut self) -> Result<(), DomainError> {
        if self.status != InviteStatus::Pending {
            return Err(DomainError::invalid_state(
                self.status.to_string(),
                InviteStatus::Revoked.to_string(),
            ));
        }
        self.status = InviteStatus::Revoked;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod role_tests {
        use super::*;

        #[test]
        fn test_workspace_role_ordering() {
            assert!(WorkspaceRole::Owner > WorkspaceRole::Admin);
            assert!(WorkspaceRole::Admin > WorkspaceRole::Member);
            assert!(WorkspaceRole::Member > WorkspaceRole::Guest);
            assert!(WorkspaceRole::Admin.at_least(WorkspaceRole::Member));
            assert!(!WorkspaceRole::Guest.at_least(WorkspaceRole::Member));
        }

        #[test]
        fn test_project_role_ordering() {
            assert!(ProjectRole::ProjectAdmin > ProjectRole::Editor);
            assert!(ProjectRole::Editor > ProjectRole::Viewer);
            assert!(ProjectRole::Editor.at_least(ProjectRole::Viewer));
        }

        #[test]
        fn test_explicit_project_membership_wins() {
            // An explicit Viewer membership beats a derived ProjectAdmin
            let role = effective_project_role(
                Some(ProjectRole::Viewer),
                Some(WorkspaceRole::Owner),
            );
            assert_eq!(role, Some(ProjectRole::Viewer));
        }

        #[test]
        fn test_derived_roles() {
            assert_eq!(
                effective_project_role(None, Some(WorkspaceRole::Owner)),
                Some(ProjectRole::ProjectAdmin)
            );
            assert_eq!(
                effective_project_role(None, Some(WorkspaceRole::Admin)),
                Some(ProjectRole::ProjectAdmin)
            );
            assert_eq!(
                effective_project_role(None, Some(WorkspaceRole::Member)),
                Some(ProjectRole::Viewer)
            );
            assert_eq!(effective_project_role(None, Some(WorkspaceRole::Guest)), None);
            assert_eq!(effective_project_role(None, None), None);
        }
    }

    mod workspace_tests {
        use super::*;

        #[test]
        fn test_new_validates_name() {
            assert!(Workspace::new("", None).is_err());
            assert!(Workspace::new("   ", None).is_err());
            assert!(Workspace::new("Alpha", None).is_ok());
        }

        #[test]
        fn test_rename_bumps_updated_at() {
            let mut ws = Workspace::new("Alpha", None).unwrap();
            let before = ws.updated_at();
            std::thread::sleep(std::time::Duration::from_millis(2));
            ws.rename("Beta", Some("renamed".to_string())).unwrap();
            assert_eq!(ws.name(), "Beta");
            assert!(ws.updated_at() > before);
        }
    }

    mod invite_tests {
        use super::*;

        fn pending_invite() -> WorkspaceInvite {
            WorkspaceInvite::new(
                WorkspaceId::new(),
                Email::new("invitee@example.com").unwrap(),
                WorkspaceRole::Member,
                "tok-123".to_string(),
                UserId::new(),
            )
        }

        #[test]
        fn test_accept_pending() {
            let mut invite = pending_invite();
            invite.accept(Utc::now()).unwrap();
            assert_eq!(invite.status(), InviteStatus::Accepted);
            assert!(invite.accepted_at().is_some());
        }

        #[test]
        fn test_accept_twice_rejected() {
            let mut invite = pending_invite();
            invite.accept(Utc::now()).unwrap();
            assert!(invite.accept(Utc::now()).is_err());
        }

        #[test]
        fn test_accept_expired_rejected() {
            let mut invite = pending_invite();
            let future = Utc::now() + chrono::Duration::days(INVITE_TTL_DAYS + 1);
            assert!(invite.accept(future).is_err());
            assert_eq!(invite.status(), InviteStatus::Expired);
        }

        #[test]
        fn test_revoke_then_accept_rejected() {
            let mut invite = pending_invite();
            invite.revoke().unwrap();
            assert!(invite.accept(Utc::now()).is_err());
        }
    }
}
