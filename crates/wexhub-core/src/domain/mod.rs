//! Domain entities and business logic
//!
//! This module contains the core domain types for WexHub:
//! - Newtypes for type-safe identifiers and validated domain values
//! - Identity types: users, workspaces, projects, memberships, invites
//! - File catalog and upload-session state machine
//! - Model versions and the processing state machine
//! - OAuth apps, authorization codes, refresh-token families
//! - Personal access tokens
//! - Audit events and extracted IFC properties
//! - Domain-specific error taxonomy and the scope vocabulary

pub mod audit;
pub mod errors;
pub mod file;
pub mod identity;
pub mod job;
pub mod model;
pub mod newtypes;
pub mod oauth;
pub mod pat;
pub mod properties;
pub mod scope;
pub mod upload;

// Re-export commonly used types
pub use audit::{AuditEntry, AuditSubject, OAuthAppEvent, PatEvent};
pub use errors::{DomainError, OAuthErrorCode};
pub use file::{File, FileCategory, FileKind, StorageUsage};
pub use identity::{
    effective_project_role, InviteStatus, Project, ProjectMembership, ProjectRole, User,
    Workspace, WorkspaceInvite, WorkspaceMembership, WorkspaceRole,
};
pub use job::{JobEnvelope, ProcessingPayload, JOB_TYPE_EXTRACT_PROPERTIES, JOB_TYPE_IFC_TO_WEXBIM};
pub use model::{Model, ModelVersion, VersionStatus};
pub use newtypes::*;
pub use oauth::{AuthorizationCode, ClientType, OAuthApp, PkceMethod, RefreshTokenRecord};
pub use pat::PersonalAccessToken;
pub use properties::{ElementProperties, IfcElement, PropertyFilter};
pub use scope::{Principal, Scope, ScopeSet};
pub use upload::{UploadMode, UploadSession, UploadStatus};
