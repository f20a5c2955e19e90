//! Upload session state machine
//!
//! ```text
//!             reserve
//!    ∅ ─────────────────▶ Reserved
//!                          │  │
//!               directMode │  │ serverProxy: upload-content
//!                          │  ▼
//!                          │ Uploading
//!                          │  │
//!                          │  │ commit (size+exists verified)
//!                          ▼  ▼
//!                        Committed (terminal)
//! ```
//!
//! Expiry is lazy: any access past `expires_at` observes the session as
//! Expired. A failed commit existence check transitions to Failed. Both
//! are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{FileId, ProjectId, StorageKey, UploadId};

/// Session lifetime from reservation to expiry
pub const SESSION_TTL_HOURS: i64 = 24;

/// Status of an upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Reserved, no content received yet
    Reserved,
    /// At least one content upload has started or completed
    Uploading,
    /// Commit succeeded; terminal
    Committed,
    /// The expiry instant passed before commit; terminal
    Expired,
    /// Commit failed its existence check; terminal
    Failed,
}

impl UploadStatus {
    /// Returns true for states no transition may leave
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Committed | UploadStatus::Expired | UploadStatus::Failed
        )
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UploadStatus::Reserved => "reserved",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Committed => "committed",
            UploadStatus::Expired => "expired",
            UploadStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// How content reaches the blob store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// Content is streamed through the API server
    ServerProxy,
    /// Content goes straight to the blob store via a pre-signed URL
    DirectToBlob,
}

impl std::fmt::Display for UploadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UploadMode::ServerProxy => "server_proxy",
            UploadMode::DirectToBlob => "direct_to_blob",
        };
        write!(f, "{s}")
    }
}

/// A reserved upload slot with its temporary storage key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    id: UploadId,
    project_id: ProjectId,
    file_name: String,
    content_type: String,
    expected_size_bytes: Option<u64>,
    status: UploadStatus,
    upload_mode: UploadMode,
    temp_storage_key: StorageKey,
    /// Pre-signed PUT URL, present only in DirectToBlob mode
    direct_upload_url: Option<String>,
    committed_file_id: Option<FileId>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl UploadSession {
    /// Reserves a new session
    #[allow(clippy::too_many_arguments)]
    pub fn reserve(
        id: UploadId,
        project_id: ProjectId,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        expected_size_bytes: Option<u64>,
        upload_mode: UploadMode,
        temp_storage_key: StorageKey,
        direct_upload_url: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            project_id,
            file_name: file_name.into(),
            content_type: content_type.into(),
            expected_size_bytes,
            status: UploadStatus::Reserved,
            upload_mode,
            temp_storage_key,
            direct_upload_url,
            committed_file_id: None,
            created_at: now,
            expires_at: now + chrono::Duration::hours(SESSION_TTL_HOURS),
        }
    }

    /// Reconstitutes a session from stored fields
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: UploadId,
        project_id: ProjectId,
        file_name: String,
        content_type: String,
        expected_size_bytes: Option<u64>,
        status: UploadStatus,
        upload_mode: UploadMode,
        temp_storage_key: StorageKey,
        direct_upload_url: Option<String>,
        committed_file_id: Option<FileId>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            project_id,
            file_name,
            content_type,
            expected_size_bytes,
            status,
            upload_mode,
            temp_storage_key,
            direct_upload_url,
            committed_file_id,
            created_at,
            expires_at,
        }
    }

    pub fn id(&self) -> UploadId {
        self.id
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn expected_size_bytes(&self) -> Option<u64> {
        self.expected_size_bytes
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn upload_mode(&self) -> UploadMode {
        self.upload_mode
    }

    pub fn temp_storage_key(&self) -> &StorageKey {
        &self.temp_storage_key
    }

    pub fn direct_upload_url(&self) -> Option<&str> {
        self.direct_upload_url.as_deref()
    }

    pub fn committed_file_id(&self) -> Option<FileId> {
        self.committed_file_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true once the expiry instant has passed and the session is
    /// not already terminal
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && now > self.expires_at
    }

    /// Applies lazy expiry: transitions a live session past its deadline
    /// to Expired. Returns true when the transition happened.
    pub fn check_expiry(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_expired(now) {
            self.status = UploadStatus::Expired;
            true
        } else {
            false
        }
    }

    /// Records that content streaming has started (server-proxy path, also
    /// tolerated as a fallback while in DirectToBlob mode)
    pub fn begin_upload(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.check_expiry(now) {
            return Err(DomainError::invalid_state(
                UploadStatus::Expired.to_string(),
                UploadStatus::Uploading.to_string(),
            ));
        }
        match self.status {
            UploadStatus::Reserved | UploadStatus::Uploading => {
                self.status = UploadStatus::Uploading;
                Ok(())
            }
            other => Err(DomainError::invalid_state(
                other.to_string(),
                UploadStatus::Uploading.to_string(),
            )),
        }
    }

    /// Checks whether a commit could proceed from the current state,
    /// without transitioning
    ///
    /// Rejected when terminal, expired, or when a server-proxy session has
    /// received no content yet.
    pub fn ensure_committable(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.is_expired(now) {
            return Err(DomainError::invalid_state(
                UploadStatus::Expired.to_string(),
                UploadStatus::Committed.to_string(),
            ));
        }
        match (self.status, self.upload_mode) {
            (UploadStatus::Uploading, _) | (UploadStatus::Reserved, UploadMode::DirectToBlob) => {
                Ok(())
            }
            (UploadStatus::Reserved, UploadMode::ServerProxy) => Err(DomainError::Validation(
                "Upload session has no content to commit".to_string(),
            )),
            (other, _) => Err(DomainError::invalid_state(
                other.to_string(),
                UploadStatus::Committed.to_string(),
            )),
        }
    }

    /// Commits the session, linking the created file
    pub fn commit(&mut self, file_id: FileId, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.check_expiry(now) {
            return Err(DomainError::invalid_state(
                UploadStatus::Expired.to_string(),
                UploadStatus::Committed.to_string(),
            ));
        }
        self.ensure_committable(now)?;
        self.status = UploadStatus::Committed;
        self.committed_file_id = Some(file_id);
        Ok(())
    }

    /// Marks the session Failed after a commit existence check missed
    pub fn fail(&mut self) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_state(
                self.status.to_string(),
                UploadStatus::Failed.to_string(),
            ));
        }
        self.status = UploadStatus::Failed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(mode: UploadMode) -> UploadSession {
        UploadSession::reserve(
            UploadId::new(),
            ProjectId::new(),
            "model.ifc",
            "application/x-step",
            Some(1024),
            mode,
            StorageKey::new("ws/proj/uploads/x.ifc").unwrap(),
            None,
        )
    }

    #[test]
    fn test_reserve_starts_reserved() {
        let s = session(UploadMode::ServerProxy);
        assert_eq!(s.status(), UploadStatus::Reserved);
        assert!(s.committed_file_id().is_none());
        assert!(s.expires_at() > s.created_at());
    }

    #[test]
    fn test_proxy_flow_reserved_uploading_committed() {
        let mut s = session(UploadMode::ServerProxy);
        let now = Utc::now();
        s.begin_upload(now).unwrap();
        assert_eq!(s.status(), UploadStatus::Uploading);
        // A retried content upload keeps the state
        s.begin_upload(now).unwrap();
        assert_eq!(s.status(), UploadStatus::Uploading);

        let file_id = FileId::new();
        s.commit(file_id, now).unwrap();
        assert_eq!(s.status(), UploadStatus::Committed);
        assert_eq!(s.committed_file_id(), Some(file_id));
    }

    #[test]
    fn test_proxy_commit_without_content_rejected() {
        let mut s = session(UploadMode::ServerProxy);
        let err = s.commit(FileId::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(s.status(), UploadStatus::Reserved);
    }

    #[test]
    fn test_direct_commit_from_reserved() {
        let mut s = session(UploadMode::DirectToBlob);
        s.commit(FileId::new(), Utc::now()).unwrap();
        assert_eq!(s.status(), UploadStatus::Committed);
    }

    #[test]
    fn test_double_commit_rejected_without_mutation() {
        let mut s = session(UploadMode::DirectToBlob);
        let file_id = FileId::new();
        s.commit(file_id, Utc::now()).unwrap();
        let err = s.commit(FileId::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { .. }));
        // First link is untouched
        assert_eq!(s.committed_file_id(), Some(file_id));
    }

    #[test]
    fn test_lazy_expiry_blocks_transitions() {
        let mut s = session(UploadMode::ServerProxy);
        let later = Utc::now() + chrono::Duration::hours(SESSION_TTL_HOURS + 1);
        assert!(s.is_expired(later));
        assert!(s.begin_upload(later).is_err());
        assert_eq!(s.status(), UploadStatus::Expired);
        // Expired is terminal
        assert!(s.commit(FileId::new(), later).is_err());
        assert!(s.fail().is_err());
    }

    #[test]
    fn test_committed_never_expires() {
        let mut s = session(UploadMode::DirectToBlob);
        s.commit(FileId::new(), Utc::now()).unwrap();
        let later = Utc::now() + chrono::Duration::hours(SESSION_TTL_HOURS + 1);
        assert!(!s.is_expired(later));
        assert_eq!(s.status(), UploadStatus::Committed);
    }

    #[test]
    fn test_fail_from_uploading() {
        let mut s = session(UploadMode::ServerProxy);
        s.begin_upload(Utc::now()).unwrap();
        s.fail().unwrap();
        assert_eq!(s.status(), UploadStatus::Failed);
        assert!(s.begin_upload(Utc::now()).is_err());
    }
}
