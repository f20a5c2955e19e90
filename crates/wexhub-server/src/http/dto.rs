//! Wire representations
//!
//! Explicit JSON projections of the domain entities. Keys are camelCase
//! on the API surface; OAuth responses keep their RFC field names and
//! are built in the OAuth handler instead.

use serde_json::{json, Value};

use wexhub_core::domain::audit::{AuditEntry, AuditSubject};
use wexhub_core::domain::file::{File, StorageUsage};
use wexhub_core::domain::identity::{
    Project, ProjectMembership, Workspace, WorkspaceInvite, WorkspaceMembership,
};
use wexhub_core::domain::model::{Model, ModelVersion};
use wexhub_core::domain::oauth::OAuthApp;
use wexhub_core::domain::pat::PersonalAccessToken;
use wexhub_core::domain::properties::{ElementProperties, IfcElement};
use wexhub_core::domain::upload::UploadSession;
use wexhub_core::ports::Page;

pub fn workspace(workspace: &Workspace) -> Value {
    json!({
        "id": workspace.id().to_string(),
        "name": workspace.name(),
        "description": workspace.description(),
        "createdAt": workspace.created_at().to_rfc3339(),
        "updatedAt": workspace.updated_at().to_rfc3339(),
    })
}

pub fn project(project: &Project) -> Value {
    json!({
        "id": project.id().to_string(),
        "workspaceId": project.workspace_id().to_string(),
        "name": project.name(),
        "description": project.description(),
        "createdAt": project.created_at().to_rfc3339(),
        "updatedAt": project.updated_at().to_rfc3339(),
    })
}

pub fn workspace_membership(membership: &WorkspaceMembership) -> Value {
    json!({
        "id": membership.id().to_string(),
        "workspaceId": membership.workspace_id().to_string(),
        "userId": membership.user_id().to_string(),
        "role": membership.role().to_string(),
        "createdAt": membership.created_at().to_rfc3339(),
    })
}

pub fn project_membership(membership: &ProjectMembership) -> Value {
    json!({
        "id": membership.id().to_string(),
        "projectId": membership.project_id().to_string(),
        "userId": membership.user_id().to_string(),
        "role": membership.role().to_string(),
        "createdAt": membership.created_at().to_rfc3339(),
    })
}

pub fn invite(invite: &WorkspaceInvite) -> Value {
    json!({
        "id": invite.id().to_string(),
        "workspaceId": invite.workspace_id().to_string(),
        "email": invite.email().as_str(),
        "role": invite.role().to_string(),
        "token": invite.token(),
        "status": invite.status().to_string(),
        "invitedBy": invite.invited_by().to_string(),
        "createdAt": invite.created_at().to_rfc3339(),
        "expiresAt": invite.expires_at().to_rfc3339(),
    })
}

pub fn file(file: &File) -> Value {
    json!({
        "id": file.id().to_string(),
        "projectId": file.project_id().to_string(),
        "name": file.name(),
        "contentType": file.content_type(),
        "sizeBytes": file.size_bytes(),
        "checksum": file.checksum(),
        "kind": file.kind().to_string(),
        "category": file.category().to_string(),
        "isDeleted": file.is_deleted(),
        "createdAt": file.created_at().to_rfc3339(),
        "deletedAt": file.deleted_at().map(|t| t.to_rfc3339()),
    })
}

pub fn upload_session(session: &UploadSession) -> Value {
    json!({
        "id": session.id().to_string(),
        "projectId": session.project_id().to_string(),
        "fileName": session.file_name(),
        "contentType": session.content_type(),
        "expectedSizeBytes": session.expected_size_bytes(),
        "status": session.status().to_string(),
        "uploadMode": session.upload_mode().to_string(),
        "directUploadUrl": session.direct_upload_url(),
        "committedFileId": session.committed_file_id().map(|f| f.to_string()),
        "createdAt": session.created_at().to_rfc3339(),
        "expiresAt": session.expires_at().to_rfc3339(),
    })
}

pub fn model(model: &Model) -> Value {
    json!({
        "id": model.id().to_string(),
        "projectId": model.project_id().to_string(),
        "name": model.name(),
        "description": model.description(),
        "createdAt": model.created_at().to_rfc3339(),
    })
}

pub fn model_version(version: &ModelVersion) -> Value {
    json!({
        "id": version.id().to_string(),
        "modelId": version.model_id().to_string(),
        "versionNumber": version.version_number(),
        "ifcFileId": version.ifc_file_id().to_string(),
        "status": version.status().to_string(),
        "wexBimFileId": version.wexbim_file_id().map(|f| f.to_string()),
        "propertiesFileId": version.properties_file_id().map(|f| f.to_string()),
        "errorMessage": version.error_message(),
        "processedAt": version.processed_at().map(|t| t.to_rfc3339()),
        "createdAt": version.created_at().to_rfc3339(),
    })
}

pub fn oauth_app(app: &OAuthApp) -> Value {
    json!({
        "id": app.id().to_string(),
        "workspaceId": app.workspace_id().to_string(),
        "name": app.name(),
        "description": app.description(),
        "clientType": app.client_type().to_string(),
        "clientId": app.client_id(),
        "redirectUris": app.redirect_uris(),
        "allowedScopes": app.allowed_scopes().to_string(),
        "isEnabled": app.is_enabled(),
        "createdAt": app.created_at().to_rfc3339(),
        "updatedAt": app.updated_at().to_rfc3339(),
    })
}

pub fn pat(pat: &PersonalAccessToken) -> Value {
    json!({
        "id": pat.id().to_string(),
        "workspaceId": pat.workspace_id().to_string(),
        "userId": pat.user_id().to_string(),
        "name": pat.name(),
        "description": pat.description(),
        "tokenPrefix": pat.token_prefix(),
        "scopes": pat.scopes().to_string(),
        "isRevoked": pat.is_revoked(),
        "revokedAt": pat.revoked_at().map(|t| t.to_rfc3339()),
        "expiresAt": pat.expires_at().map(|t| t.to_rfc3339()),
        "lastUsedAt": pat.last_used_at().map(|t| t.to_rfc3339()),
        "createdAt": pat.created_at().to_rfc3339(),
    })
}

pub fn audit_entry(entry: &AuditEntry) -> Value {
    let (subject_id, event) = match entry.subject() {
        AuditSubject::OAuthApp { app_id, event } => (app_id.to_string(), event.to_string()),
        AuditSubject::Pat { pat_id, event } => (pat_id.to_string(), event.to_string()),
    };
    json!({
        "id": entry.id().to_string(),
        "subjectId": subject_id,
        "eventType": event,
        "actorUserId": entry.actor_user_id().map(|u| u.to_string()),
        "timestamp": entry.timestamp().to_rfc3339(),
        "details": entry.details(),
        "ipAddress": entry.ip_address(),
    })
}

pub fn usage(usage: &StorageUsage) -> Value {
    json!({
        "totalBytes": usage.total_bytes,
        "fileCount": usage.file_count,
        "calculatedAt": usage.calculated_at.to_rfc3339(),
    })
}

pub fn element(element: &IfcElement) -> Value {
    json!({
        "id": element.id.to_string(),
        "entityLabel": element.entity_label,
        "globalId": element.global_id,
        "typeName": element.type_name,
        "name": element.name,
    })
}

pub fn element_properties(entry: &ElementProperties) -> Value {
    json!({
        "element": element(&entry.element),
        "propertySets": entry.property_sets.iter().map(|pset| json!({
            "id": pset.id.to_string(),
            "name": pset.name,
            "properties": pset.properties.iter().map(|p| json!({
                "name": p.name,
                "value": p.value,
                "unit": p.unit,
            })).collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
        "quantitySets": entry.quantity_sets.iter().map(|qset| json!({
            "id": qset.id.to_string(),
            "name": qset.name,
            "quantities": qset.quantities.iter().map(|q| json!({
                "name": q.name,
                "value": q.value,
                "unit": q.unit,
            })).collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
    })
}

/// Wraps a page of items with its paging envelope
pub fn page<T>(page: &Page<T>, to_value: impl Fn(&T) -> Value) -> Value {
    json!({
        "items": page.items.iter().map(to_value).collect::<Vec<_>>(),
        "page": page.page,
        "pageSize": page.page_size,
        "totalCount": page.total_count,
    })
}
