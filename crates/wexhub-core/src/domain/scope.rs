//! Scope vocabulary and authenticated principals
//!
//! Scopes are a closed set of capability strings carried in the `scp`
//! claim of access tokens and on Personal Access Tokens. The scope gate
//! checks them before any domain logic runs.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{UserId, WorkspaceId};

/// The closed scope vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scope {
    WorkspacesRead,
    WorkspacesWrite,
    ProjectsRead,
    ProjectsWrite,
    FilesRead,
    FilesWrite,
    ModelsRead,
    ModelsWrite,
    PatsRead,
    PatsWrite,
    OAuthAppsRead,
    OAuthAppsWrite,
    OAuthAppsAdmin,
}

impl Scope {
    /// All scopes, in canonical order
    pub const ALL: [Scope; 13] = [
        Scope::WorkspacesRead,
        Scope::WorkspacesWrite,
        Scope::ProjectsRead,
        Scope::ProjectsWrite,
        Scope::FilesRead,
        Scope::FilesWrite,
        Scope::ModelsRead,
        Scope::ModelsWrite,
        Scope::PatsRead,
        Scope::PatsWrite,
        Scope::OAuthAppsRead,
        Scope::OAuthAppsWrite,
        Scope::OAuthAppsAdmin,
    ];

    /// The wire form of the scope string
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::WorkspacesRead => "workspaces:read",
            Scope::WorkspacesWrite => "workspaces:write",
            Scope::ProjectsRead => "projects:read",
            Scope::ProjectsWrite => "projects:write",
            Scope::FilesRead => "files:read",
            Scope::FilesWrite => "files:write",
            Scope::ModelsRead => "models:read",
            Scope::ModelsWrite => "models:write",
            Scope::PatsRead => "pats:read",
            Scope::PatsWrite => "pats:write",
            Scope::OAuthAppsRead => "oauth_apps:read",
            Scope::OAuthAppsWrite => "oauth_apps:write",
            Scope::OAuthAppsAdmin => "oauth_apps:admin",
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Scope {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workspaces:read" => Ok(Scope::WorkspacesRead),
            "workspaces:write" => Ok(Scope::WorkspacesWrite),
            "projects:read" => Ok(Scope::ProjectsRead),
            "projects:write" => Ok(Scope::ProjectsWrite),
            "files:read" => Ok(Scope::FilesRead),
            "files:write" => Ok(Scope::FilesWrite),
            "models:read" => Ok(Scope::ModelsRead),
            "models:write" => Ok(Scope::ModelsWrite),
            "pats:read" => Ok(Scope::PatsRead),
            "pats:write" => Ok(Scope::PatsWrite),
            "oauth_apps:read" => Ok(Scope::OAuthAppsRead),
            "oauth_apps:write" => Ok(Scope::OAuthAppsWrite),
            "oauth_apps:admin" => Ok(Scope::OAuthAppsAdmin),
            other => Err(DomainError::Validation(format!("Unknown scope: {other}"))),
        }
    }
}

/// An ordered set of scopes
///
/// Round-trips the space-separated `scp` claim format. Ordering is
/// canonical so the serialized form is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<Scope>);

impl ScopeSet {
    /// Creates an empty scope set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from individual scopes
    pub fn from_scopes(scopes: impl IntoIterator<Item = Scope>) -> Self {
        Self(scopes.into_iter().collect())
    }

    /// Parses a space-separated scope string, rejecting unknown scopes
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let mut set = BTreeSet::new();
        for part in value.split_whitespace() {
            set.insert(part.parse::<Scope>()?);
        }
        Ok(Self(set))
    }

    /// Returns true if the set contains the given scope
    pub fn contains(&self, scope: Scope) -> bool {
        self.0.contains(&scope)
    }

    /// Returns true if every scope in `other` is also in this set
    pub fn contains_all(&self, other: &ScopeSet) -> bool {
        other.0.is_subset(&self.0)
    }

    /// Returns true if the set holds no scopes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of scopes in the set
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates the scopes in canonical order
    pub fn iter(&self) -> impl Iterator<Item = Scope> + '_ {
        self.0.iter().copied()
    }
}

impl Display for ScopeSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(Scope::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        write!(f, "{joined}")
    }
}

impl FromIterator<Scope> for ScopeSet {
    fn from_iter<T: IntoIterator<Item = Scope>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The authenticated caller of a request
///
/// Produced by the bearer authenticator from either a JWT access token or
/// a Personal Access Token. `workspace` is the `tid` binding: when set,
/// the caller may only touch resources inside that workspace; when absent
/// (session-cookie callers) access spans the user's memberships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// The authenticated user
    pub user_id: UserId,
    /// The user's opaque external subject string
    pub subject: String,
    /// Workspace this credential is bound to, if any
    pub workspace: Option<WorkspaceId>,
    /// Capabilities granted to this credential
    pub scopes: ScopeSet,
}

impl Principal {
    /// Returns true when the credential may touch the given workspace
    ///
    /// An unbound principal passes; a bound one passes only for its own
    /// workspace.
    pub fn is_bound_to(&self, workspace: WorkspaceId) -> bool {
        match self.workspace {
            Some(bound) => bound == workspace,
            None => true,
        }
    }
}
