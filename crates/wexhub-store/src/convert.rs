//! Column conversion helpers
//!
//! Domain enums are stored as their snake_case display strings; the
//! functions here map them back, failing loudly on unknown values.
//! Timestamps are RFC 3339 text.

use chrono::{DateTime, Utc};

use wexhub_core::domain::audit::{OAuthAppEvent, PatEvent};
use wexhub_core::domain::file::{FileCategory, FileKind};
use wexhub_core::domain::identity::{InviteStatus, ProjectRole, WorkspaceRole};
use wexhub_core::domain::model::VersionStatus;
use wexhub_core::domain::oauth::{ClientType, PkceMethod};
use wexhub_core::domain::upload::{UploadMode, UploadStatus};

use crate::StoreError;

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("Failed to parse datetime '{s}': {e}")))
}

pub(crate) fn parse_optional_datetime(
    s: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

pub(crate) fn workspace_role_from(s: &str) -> Result<WorkspaceRole, StoreError> {
    match s {
        "guest" => Ok(WorkspaceRole::Guest),
        "member" => Ok(WorkspaceRole::Member),
        "admin" => Ok(WorkspaceRole::Admin),
        "owner" => Ok(WorkspaceRole::Owner),
        other => Err(StoreError::Decode(format!("Unknown workspace role: {other}"))),
    }
}

pub(crate) fn project_role_from(s: &str) -> Result<ProjectRole, StoreError> {
    match s {
        "viewer" => Ok(ProjectRole::Viewer),
        "editor" => Ok(ProjectRole::Editor),
        "project_admin" => Ok(ProjectRole::ProjectAdmin),
        other => Err(StoreError::Decode(format!("Unknown project role: {other}"))),
    }
}

pub(crate) fn invite_status_from(s: &str) -> Result<InviteStatus, StoreError> {
    match s {
        "pending" => Ok(InviteStatus::Pending),
        "accepted" => Ok(InviteStatus::Accepted),
        "revoked" => Ok(InviteStatus::Revoked),
        "expired" => Ok(InviteStatus::Expired),
        other => Err(StoreError::Decode(format!("Unknown invite status: {other}"))),
    }
}

pub(crate) fn file_kind_from(s: &str) -> Result<FileKind, StoreError> {
    match s {
        "source" => Ok(FileKind::Source),
        "artifact" => Ok(FileKind::Artifact),
        other => Err(StoreError::Decode(format!("Unknown file kind: {other}"))),
    }
}

pub(crate) fn file_category_from(s: &str) -> Result<FileCategory, StoreError> {
    match s {
        "ifc" => Ok(FileCategory::Ifc),
        "wexbim" => Ok(FileCategory::WexBim),
        "properties" => Ok(FileCategory::Properties),
        "other" => Ok(FileCategory::Other),
        other => Err(StoreError::Decode(format!("Unknown file category: {other}"))),
    }
}

pub(crate) fn upload_status_from(s: &str) -> Result<UploadStatus, StoreError> {
    match s {
        "reserved" => Ok(UploadStatus::Reserved),
        "uploading" => Ok(UploadStatus::Uploading),
        "committed" => Ok(UploadStatus::Committed),
        "expired" => Ok(UploadStatus::Expired),
        "failed" => Ok(UploadStatus::Failed),
        other => Err(StoreError::Decode(format!("Unknown upload status: {other}"))),
    }
}

pub(crate) fn upload_mode_from(s: &str) -> Result<UploadMode, StoreError> {
    match s {
        "server_proxy" => Ok(UploadMode::ServerProxy),
        "direct_to_blob" => Ok(UploadMode::DirectToBlob),
        other => Err(StoreError::Decode(format!("Unknown upload mode: {other}"))),
    }
}

pub(crate) fn version_status_from(s: &str) -> Result<VersionStatus, StoreError> {
    match s {
        "pending" => Ok(VersionStatus::Pending),
        "processing" => Ok(VersionStatus::Processing),
        "ready" => Ok(VersionStatus::Ready),
        "failed" => Ok(VersionStatus::Failed),
        other => Err(StoreError::Decode(format!("Unknown version status: {other}"))),
    }
}

pub(crate) fn client_type_from(s: &str) -> Result<ClientType, StoreError> {
    match s {
        "public" => Ok(ClientType::Public),
        "confidential" => Ok(ClientType::Confidential),
        other => Err(StoreError::Decode(format!("Unknown client type: {other}"))),
    }
}

pub(crate) fn pkce_method_from(s: &str) -> Result<PkceMethod, StoreError> {
    match s {
        "S256" => Ok(PkceMethod::S256),
        "plain" => Ok(PkceMethod::Plain),
        other => Err(StoreError::Decode(format!("Unknown PKCE method: {other}"))),
    }
}

pub(crate) fn oauth_event_from(s: &str) -> Result<OAuthAppEvent, StoreError> {
    match s {
        "created" => Ok(OAuthAppEvent::Created),
        "updated" => Ok(OAuthAppEvent::Updated),
        "enabled" => Ok(OAuthAppEvent::Enabled),
        "disabled" => Ok(OAuthAppEvent::Disabled),
        "deleted" => Ok(OAuthAppEvent::Deleted),
        "secret_rotated" => Ok(OAuthAppEvent::SecretRotated),
        "refresh_token_issued" => Ok(OAuthAppEvent::RefreshTokenIssued),
        other => Err(StoreError::Decode(format!("Unknown app audit event: {other}"))),
    }
}

pub(crate) fn pat_event_from(s: &str) -> Result<PatEvent, StoreError> {
    match s {
        "created" => Ok(PatEvent::Created),
        "updated" => Ok(PatEvent::Updated),
        "revoked_by_user" => Ok(PatEvent::RevokedByUser),
        "revoked_by_admin" => Ok(PatEvent::RevokedByAdmin),
        "used" => Ok(PatEvent::Used),
        other => Err(StoreError::Decode(format!("Unknown PAT audit event: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_roundtrip_through_display() {
        for role in [
            WorkspaceRole::Guest,
            WorkspaceRole::Member,
            WorkspaceRole::Admin,
            WorkspaceRole::Owner,
        ] {
            assert_eq!(workspace_role_from(&role.to_string()).unwrap(), role);
        }
        for role in [
            ProjectRole::Viewer,
            ProjectRole::Editor,
            ProjectRole::ProjectAdmin,
        ] {
            assert_eq!(project_role_from(&role.to_string()).unwrap(), role);
        }
    }

    #[test]
    fn test_statuses_roundtrip_through_display() {
        for status in [
            UploadStatus::Reserved,
            UploadStatus::Uploading,
            UploadStatus::Committed,
            UploadStatus::Expired,
            UploadStatus::Failed,
        ] {
            assert_eq!(upload_status_from(&status.to_string()).unwrap(), status);
        }
        for status in [
            VersionStatus::Pending,
            VersionStatus::Processing,
            VersionStatus::Ready,
            VersionStatus::Failed,
        ] {
            assert_eq!(version_status_from(&status.to_string()).unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_values_rejected() {
        assert!(workspace_role_from("emperor").is_err());
        assert!(version_status_from("stuck").is_err());
        assert!(pkce_method_from("s256").is_err());
    }

    #[test]
    fn test_datetime_roundtrip() {
        let now = Utc::now();
        let parsed = parse_datetime(&now.to_rfc3339()).unwrap();
        assert_eq!(parsed, now);
        assert!(parse_datetime("yesterday").is_err());
        assert_eq!(parse_optional_datetime(None).unwrap(), None);
    }
}
