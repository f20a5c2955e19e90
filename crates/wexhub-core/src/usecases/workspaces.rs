//! Workspace management use cases
//!
//! Workspace CRUD, membership administration, and the invite flow. The
//! write-side invariants live here: memberships are unique per user, and
//! the last Owner can neither be demoted nor removed.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::identity::{
    Workspace, WorkspaceInvite, WorkspaceMembership, WorkspaceRole,
};
use crate::domain::newtypes::{Email, UniqueId, UserId, WorkspaceId};
use crate::domain::scope::{Principal, Scope};
use crate::ports::IdentityRepository;

use super::access::AccessGate;

fn transient(e: anyhow::Error) -> DomainError {
    DomainError::Transient(e.to_string())
}

/// Use case for workspace lifecycle and membership administration
pub struct WorkspaceService {
    identity: Arc<dyn IdentityRepository>,
    gate: Arc<AccessGate>,
}

impl WorkspaceService {
    pub fn new(identity: Arc<dyn IdentityRepository>, gate: Arc<AccessGate>) -> Self {
        Self { identity, gate }
    }

    /// Creates a workspace; the caller becomes its founding Owner
    pub async fn create_workspace(
        &self,
        principal: &Principal,
        name: &str,
        description: Option<String>,
    ) -> Result<Workspace, DomainError> {
        self.gate.require_scope(principal, Scope::WorkspacesWrite)?;

        let workspace = Workspace::new(name, description)?;
        let owner =
            WorkspaceMembership::new(workspace.id(), principal.user_id, WorkspaceRole::Owner);
        self.identity
            .create_workspace(&workspace, &owner)
            .await
            .map_err(transient)?;

        info!(workspace_id = %workspace.id(), user_id = %principal.user_id, "Workspace created");
        Ok(workspace)
    }

    /// Lists the caller's workspaces (or just the bound one)
    pub async fn list_workspaces(
        &self,
        principal: &Principal,
    ) -> Result<Vec<Workspace>, DomainError> {
        self.gate.require_scope(principal, Scope::WorkspacesRead)?;
        let all = self
            .identity
            .list_workspaces_for_user(principal.user_id)
            .await
            .map_err(transient)?;
        Ok(match principal.workspace {
            Some(bound) => all.into_iter().filter(|w| w.id() == bound).collect(),
            None => all,
        })
    }

    /// Retrieves a workspace the caller is a member of
    pub async fn get_workspace(
        &self,
        principal: &Principal,
        workspace_id: WorkspaceId,
    ) -> Result<Workspace, DomainError> {
        self.gate.require_scope(principal, Scope::WorkspacesRead)?;
        let result: Result<Workspace, DomainError> = async {
            let workspace = self.gate.workspace_in_scope(principal, workspace_id).await?;
            self.gate
                .require_workspace_role(principal, workspace_id, WorkspaceRole::Guest)
                .await?;
            Ok(workspace)
        }
        .await;
        result.map_err(|e| e.masked("workspace"))
    }

    /// Renames a workspace; requires Admin
    pub async fn update_workspace(
        &self,
        principal: &Principal,
        workspace_id: WorkspaceId,
        name: &str,
        description: Option<String>,
    ) -> Result<Workspace, DomainError> {
        self.gate.require_scope(principal, Scope::WorkspacesWrite)?;
        let mut workspace = self.gate.workspace_in_scope(principal, workspace_id).await?;
        self.gate
            .require_workspace_role(principal, workspace_id, WorkspaceRole::Admin)
            .await?;

        workspace.rename(name, description)?;
        self.identity
            .update_workspace(&workspace)
            .await
            .map_err(transient)?;
        Ok(workspace)
    }

    // ========================================================================
    // Membership administration
    // ========================================================================

    /// Lists a workspace's members; requires membership
    pub async fn list_members(
        &self,
        principal: &Principal,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<WorkspaceMembership>, DomainError> {
        self.gate.require_scope(principal, Scope::WorkspacesRead)?;
        let result: Result<Vec<WorkspaceMembership>, DomainError> = async {
            self.gate.workspace_in_scope(principal, workspace_id).await?;
            self.gate
                .require_workspace_role(principal, workspace_id, WorkspaceRole::Guest)
                .await?;
            self.identity
                .list_workspace_members(workspace_id)
                .await
                .map_err(transient)
        }
        .await;
        result.map_err(|e| e.masked("workspace"))
    }

    /// Changes a member's role
    ///
    /// Requires Admin; touching an Owner (promoting to or demoting from)
    /// requires Owner; the last Owner cannot be demoted.
    pub async fn change_member_role(
        &self,
        principal: &Principal,
        workspace_id: WorkspaceId,
        target_user: UserId,
        new_role: WorkspaceRole,
    ) -> Result<WorkspaceMembership, DomainError> {
        self.gate.require_scope(principal, Scope::WorkspacesWrite)?;
        self.gate.workspace_in_scope(principal, workspace_id).await?;
        let caller = self
            .gate
            .require_workspace_role(principal, workspace_id, WorkspaceRole::Admin)
            .await?;

        let mut membership = self
            .identity
            .get_workspace_membership(workspace_id, target_user)
            .await
            .map_err(transient)?
            .ok_or_else(|| DomainError::NotFound("membership".to_string()))?;

        let touches_owner =
            membership.role() == WorkspaceRole::Owner || new_role == WorkspaceRole::Owner;
        if touches_owner && !caller.role().at_least(WorkspaceRole::Owner) {
            return Err(DomainError::Authorization(
                "Only an Owner may transfer or revoke ownership".to_string(),
            ));
        }
        if membership.role() == WorkspaceRole::Owner && new_role < WorkspaceRole::Owner {
            let owners = self
                .identity
                .count_owners(workspace_id)
                .await
                .map_err(transient)?;
            if owners <= 1 {
                return Err(DomainError::Validation(
                    "The last Owner of a workspace cannot be demoted".to_string(),
                ));
            }
        }

        membership.set_role(new_role);
        self.identity
            .save_workspace_membership(&membership)
            .await
            .map_err(transient)?;
        Ok(membership)
    }

    /// Removes a member (admin action) or lets a member leave
    ///
    /// The last Owner can never be removed. Removing an Owner requires
    /// Owner; members may always remove themselves (subject to the same
    /// last-Owner rule).
    pub async fn remove_member(
        &self,
        principal: &Principal,
        workspace_id: WorkspaceId,
        target_user: UserId,
    ) -> Result<(), DomainError> {
        self.gate.require_scope(principal, Scope::WorkspacesWrite)?;
        self.gate.workspace_in_scope(principal, workspace_id).await?;

        let self_removal = principal.user_id == target_user;
        let caller = if self_removal {
            self.gate
                .require_workspace_role(principal, workspace_id, WorkspaceRole::Guest)
                .await?
        } else {
            self.gate
                .require_workspace_role(principal, workspace_id, WorkspaceRole::Admin)
                .await?
        };

        let membership = self
            .identity
            .get_workspace_membership(workspace_id, target_user)
            .await
            .map_err(transient)?
            .ok_or_else(|| DomainError::NotFound("membership".to_string()))?;

        if membership.role() == WorkspaceRole::Owner {
            if !self_removal && !caller.role().at_least(WorkspaceRole::Owner) {
                return Err(DomainError::Authorization(
                    "Only an Owner may remove an Owner".to_string(),
                ));
            }
            let owners = self
                .identity
                .count_owners(workspace_id)
                .await
                .map_err(transient)?;
            if owners <= 1 {
                return Err(DomainError::Validation(
                    "The last Owner of a workspace cannot leave".to_string(),
                ));
            }
        }

        self.identity
            .delete_workspace_membership(membership.id())
            .await
            .map_err(transient)?;
        info!(workspace_id = %workspace_id, user_id = %target_user, "Membership removed");
        Ok(())
    }

    // ========================================================================
    // Invites
    // ========================================================================

    /// Invites an email address into the workspace; requires Admin
    ///
    /// Conflicts: the address already belongs to a member, or a pending
    /// invite for it exists.
    pub async fn create_invite(
        &self,
        principal: &Principal,
        workspace_id: WorkspaceId,
        email: Email,
        role: WorkspaceRole,
    ) -> Result<WorkspaceInvite, DomainError> {
        self.gate.require_scope(principal, Scope::WorkspacesWrite)?;
        self.gate.workspace_in_scope(principal, workspace_id).await?;
        self.gate
            .require_workspace_role(principal, workspace_id, WorkspaceRole::Admin)
            .await?;
        if role == WorkspaceRole::Owner {
            return Err(DomainError::Validation(
                "Ownership cannot be granted through an invite".to_string(),
            ));
        }

        // Already a member?
        let members = self
            .identity
            .list_workspace_members(workspace_id)
            .await
            .map_err(transient)?;
        for member in &members {
            let user = self
                .identity
                .get_user(member.user_id())
                .await
                .map_err(transient)?;
            if user.and_then(|u| u.email().cloned()).as_ref() == Some(&email) {
                return Err(DomainError::Conflict(
                    "The invited address already belongs to a member".to_string(),
                ));
            }
        }

        // Pending invite already out?
        if self
            .identity
            .find_pending_invite(workspace_id, &email)
            .await
            .map_err(transient)?
            .is_some()
        {
            return Err(DomainError::Conflict(
                "A pending invite for this address already exists".to_string(),
            ));
        }

        let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let invite =
            WorkspaceInvite::new(workspace_id, email, role, token, principal.user_id);
        self.identity
            .create_invite(&invite)
            .await
            .map_err(transient)?;
        info!(workspace_id = %workspace_id, invite_id = %invite.id(), "Invite created");
        Ok(invite)
    }

    /// Lists a workspace's invites; requires Admin
    pub async fn list_invites(
        &self,
        principal: &Principal,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<WorkspaceInvite>, DomainError> {
        self.gate.require_scope(principal, Scope::WorkspacesRead)?;
        let result: Result<Vec<WorkspaceInvite>, DomainError> = async {
            self.gate.workspace_in_scope(principal, workspace_id).await?;
            self.gate
                .require_workspace_role(principal, workspace_id, WorkspaceRole::Admin)
                .await?;
            self.identity
                .list_invites(workspace_id)
                .await
                .map_err(transient)
        }
        .await;
        result.map_err(|e| e.masked("workspace"))
    }

    /// Revokes a pending invite; requires Admin
    pub async fn revoke_invite(
        &self,
        principal: &Principal,
        workspace_id: WorkspaceId,
        invite_id: UniqueId,
    ) -> Result<(), DomainError> {
        self.gate.require_scope(principal, Scope::WorkspacesWrite)?;
        self.gate.workspace_in_scope(principal, workspace_id).await?;
        self.gate
            .require_workspace_role(principal, workspace_id, WorkspaceRole::Admin)
            .await?;

        let mut invite = self
            .identity
            .list_invites(workspace_id)
            .await
            .map_err(transient)?
            .into_iter()
            .find(|i| i.id() == invite_id)
            .ok_or_else(|| DomainError::NotFound("invite".to_string()))?;
        invite.revoke()?;
        self.identity
            .update_invite(&invite)
            .await
            .map_err(transient)?;
        Ok(())
    }

    /// Accepts an invite by token, creating the membership
    ///
    /// One-shot: a second acceptance, a revoked invite, or an expired one
    /// all fail. Joining a workspace the caller already belongs to is a
    /// conflict.
    pub async fn accept_invite(
        &self,
        principal: &Principal,
        token: &str,
    ) -> Result<WorkspaceMembership, DomainError> {
        let mut invite = self
            .identity
            .get_invite_by_token(token)
            .await
            .map_err(transient)?
            .ok_or_else(|| DomainError::NotFound("invite".to_string()))?;

        if self
            .identity
            .get_workspace_membership(invite.workspace_id(), principal.user_id)
            .await
            .map_err(transient)?
            .is_some()
        {
            return Err(DomainError::Conflict(
                "Already a member of this workspace".to_string(),
            ));
        }

        invite.accept(chrono::Utc::now())?;
        let membership =
            WorkspaceMembership::new(invite.workspace_id(), principal.user_id, invite.role());
        self.identity
            .save_workspace_membership(&membership)
            .await
            .map_err(transient)?;
        self.identity
            .update_invite(&invite)
            .await
            .map_err(transient)?;
        info!(
            workspace_id = %invite.workspace_id(),
            user_id = %principal.user_id,
            "Invite accepted"
        );
        Ok(membership)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scope::ScopeSet;
    use crate::usecases::testing::MemoryIdentityRepository;

    use crate::domain::identity::User;

    fn principal_for(user: &User) -> Principal {
        Principal {
            user_id: user.id(),
            subject: user.subject().to_string(),
            workspace: None,
            scopes: ScopeSet::parse("workspaces:read workspaces:write").unwrap(),
        }
    }

    async fn service() -> (WorkspaceService, Arc<MemoryIdentityRepository>) {
        let repo = Arc::new(MemoryIdentityRepository::new());
        let gate = Arc::new(AccessGate::new(repo.clone()));
        (WorkspaceService::new(repo.clone(), gate), repo)
    }

    async fn user(repo: &MemoryIdentityRepository, subject: &str, email: Option<&str>) -> User {
        let mut u = User::new(subject, subject);
        if let Some(e) = email {
            u.set_email(Email::new(e).unwrap());
        }
        repo.create_user(&u).await.unwrap();
        u
    }

    #[tokio::test]
    async fn test_creator_becomes_owner() {
        let (service, repo) = service().await;
        let alice = user(&repo, "alice", None).await;
        let p = principal_for(&alice);

        let ws = service.create_workspace(&p, "W", None).await.unwrap();
        let membership = repo
            .get_workspace_membership(ws.id(), alice.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(membership.role(), WorkspaceRole::Owner);
        assert_eq!(repo.count_owners(ws.id()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_last_owner_cannot_be_demoted_or_removed() {
        let (service, repo) = service().await;
        let alice = user(&repo, "alice", None).await;
        let p = principal_for(&alice);
        let ws = service.create_workspace(&p, "W", None).await.unwrap();

        let demote = service
            .change_member_role(&p, ws.id(), alice.id(), WorkspaceRole::Admin)
            .await;
        assert!(matches!(demote, Err(DomainError::Validation(_))));

        let leave = service.remove_member(&p, ws.id(), alice.id()).await;
        assert!(matches!(leave, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_second_owner_unlocks_demotion() {
        let (service, repo) = service().await;
        let alice = user(&repo, "alice", None).await;
        let bob = user(&repo, "bob", None).await;
        let p = principal_for(&alice);
        let ws = service.create_workspace(&p, "W", None).await.unwrap();
        repo.save_workspace_membership(&WorkspaceMembership::new(
            ws.id(),
            bob.id(),
            WorkspaceRole::Owner,
        ))
        .await
        .unwrap();

        service
            .change_member_role(&p, ws.id(), alice.id(), WorkspaceRole::Admin)
            .await
            .unwrap();
        assert_eq!(repo.count_owners(ws.id()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_admin_cannot_touch_owner_role() {
        let (service, repo) = service().await;
        let alice = user(&repo, "alice", None).await;
        let carol = user(&repo, "carol", None).await;
        let p_alice = principal_for(&alice);
        let ws = service.create_workspace(&p_alice, "W", None).await.unwrap();
        repo.save_workspace_membership(&WorkspaceMembership::new(
            ws.id(),
            carol.id(),
            WorkspaceRole::Admin,
        ))
        .await
        .unwrap();

        let p_carol = principal_for(&carol);
        let attempt = service
            .change_member_role(&p_carol, ws.id(), alice.id(), WorkspaceRole::Member)
            .await;
        assert!(matches!(attempt, Err(DomainError::Authorization(_))));
    }

    #[tokio::test]
    async fn test_invite_flow_roundtrip() {
        let (service, repo) = service().await;
        let alice = user(&repo, "alice", None).await;
        let bob = user(&repo, "bob", Some("bob@example.com")).await;
        let p_alice = principal_for(&alice);
        let ws = service.create_workspace(&p_alice, "W", None).await.unwrap();

        let invite = service
            .create_invite(
                &p_alice,
                ws.id(),
                Email::new("bob@example.com").unwrap(),
                WorkspaceRole::Member,
            )
            .await
            .unwrap();

        // A duplicate pending invite conflicts
        let dup = service
            .create_invite(
                &p_alice,
                ws.id(),
                Email::new("bob@example.com").unwrap(),
                WorkspaceRole::Member,
            )
            .await;
        assert!(matches!(dup, Err(DomainError::Conflict(_))));

        let p_bob = principal_for(&bob);
        let membership = service.accept_invite(&p_bob, invite.token()).await.unwrap();
        assert_eq!(membership.role(), WorkspaceRole::Member);

        // The token is one-shot
        let again = service.accept_invite(&p_bob, invite.token()).await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_inviting_existing_member_conflicts() {
        let (service, repo) = service().await;
        let alice = user(&repo, "alice", Some("alice@example.com")).await;
        let p = principal_for(&alice);
        let ws = service.create_workspace(&p, "W", None).await.unwrap();

        let attempt = service
            .create_invite(
                &p,
                ws.id(),
                Email::new("alice@example.com").unwrap(),
                WorkspaceRole::Member,
            )
            .await;
        assert!(matches!(attempt, Err(DomainError::Conflict(_))));
    }
}
