//! Upload pipeline use cases
//!
//! Orchestrates the reserve → upload-content → commit machine against the
//! blob store and the session repository. Role and scope gating happens
//! first on every step; expiry is evaluated lazily on each access.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::errors::DomainError;
use crate::domain::file::{extension_of, File, FileCategory, FileKind};
use crate::domain::identity::ProjectRole;
use crate::domain::newtypes::{ProjectId, StorageKey, UploadId};
use crate::domain::scope::{Principal, Scope};
use crate::domain::upload::{UploadMode, UploadSession};
use crate::ports::blob_store::BlobReader;
use crate::ports::{BlobStore, CatalogRepository, UploadRepository};

use super::access::AccessGate;

fn transient(e: anyhow::Error) -> DomainError {
    DomainError::Transient(e.to_string())
}

/// Parameters of a reservation request
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub file_name: String,
    pub content_type: Option<String>,
    pub expected_size_bytes: Option<u64>,
    pub prefer_direct_upload: bool,
}

/// A reservation, with the constraints the client must respect
#[derive(Debug, Clone)]
pub struct ReserveOutcome {
    pub session: UploadSession,
    pub max_file_size_bytes: u64,
}

/// A successful commit: the terminal session and its durable file
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub session: UploadSession,
    pub file: File,
}

/// Use case driving the upload session state machine
pub struct UploadService {
    gate: Arc<AccessGate>,
    uploads: Arc<dyn UploadRepository>,
    catalog: Arc<dyn CatalogRepository>,
    blobs: Arc<dyn BlobStore>,
    max_file_size_bytes: u64,
}

impl UploadService {
    pub fn new(
        gate: Arc<AccessGate>,
        uploads: Arc<dyn UploadRepository>,
        catalog: Arc<dyn CatalogRepository>,
        blobs: Arc<dyn BlobStore>,
        max_file_size_bytes: u64,
    ) -> Self {
        Self {
            gate,
            uploads,
            catalog,
            blobs,
            max_file_size_bytes,
        }
    }

    /// Reserves an upload session for a project
    ///
    /// Requires Editor and `files:write`. Derives the deterministic temp
    /// storage key and, when the client prefers it and the backend
    /// supports it, a pre-signed direct upload URL; otherwise the session
    /// proxies through the server.
    pub async fn reserve(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        request: ReserveRequest,
    ) -> Result<ReserveOutcome, DomainError> {
        self.gate.require_scope(principal, Scope::FilesWrite)?;
        let project = self.gate.project_in_scope(principal, project_id).await?;
        self.gate
            .require_project_role(principal, &project, ProjectRole::Editor)
            .await?;

        if request.file_name.trim().is_empty() {
            return Err(DomainError::Validation(
                "fileName must not be empty".to_string(),
            ));
        }
        match request.expected_size_bytes {
            Some(0) => {
                return Err(DomainError::Validation(
                    "expectedSizeBytes must be positive".to_string(),
                ));
            }
            Some(size) if size > self.max_file_size_bytes => {
                return Err(DomainError::Validation(format!(
                    "expectedSizeBytes exceeds the maximum of {} bytes",
                    self.max_file_size_bytes
                )));
            }
            _ => {}
        }

        let upload_id = UploadId::new();
        let ext = extension_of(&request.file_name).unwrap_or_default();
        let key = StorageKey::for_upload(project.workspace_id(), project_id, upload_id, &ext);

        let expires_at = Utc::now() + chrono::Duration::hours(crate::domain::upload::SESSION_TTL_HOURS);
        // Direct mode only when asked for and the backend can mint a URL;
        // no URL means ServerProxy fallback.
        let presigned = if request.prefer_direct_upload {
            self.blobs
                .presign_put(&key, expires_at)
                .await
                .map_err(transient)?
        } else {
            None
        };
        let (mode, direct_url) = match presigned {
            Some(grant) => (UploadMode::DirectToBlob, Some(grant.url)),
            None => (UploadMode::ServerProxy, None),
        };

        let session = UploadSession::reserve(
            upload_id,
            project_id,
            request.file_name,
            request
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            request.expected_size_bytes,
            mode,
            key,
            direct_url,
        );
        self.uploads
            .create_session(&session)
            .await
            .map_err(transient)?;

        info!(
            session_id = %session.id(),
            project_id = %project_id,
            mode = %session.upload_mode(),
            "Upload session reserved"
        );
        Ok(ReserveOutcome {
            session,
            max_file_size_bytes: self.max_file_size_bytes,
        })
    }

    /// Streams content into a reserved session (server-proxy path)
    ///
    /// `declared_size` is the length the transport announced, checked
    /// before streaming; the byte count actually written is checked after.
    /// A mismatch discards the temp blob and leaves the session in
    /// Uploading so the client can retry.
    pub async fn upload_content(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        session_id: UploadId,
        declared_size: Option<u64>,
        reader: &mut BlobReader,
    ) -> Result<UploadSession, DomainError> {
        self.gate.require_scope(principal, Scope::FilesWrite)?;
        let project = self.gate.project_in_scope(principal, project_id).await?;
        self.gate
            .require_project_role(principal, &project, ProjectRole::Editor)
            .await?;

        let mut session = self.load_session(project_id, session_id).await?;

        if let Some(declared) = declared_size {
            if declared > self.max_file_size_bytes {
                return Err(DomainError::Validation(format!(
                    "File exceeds the maximum of {} bytes",
                    self.max_file_size_bytes
                )));
            }
            if let Some(expected) = session.expected_size_bytes() {
                if declared != expected {
                    return Err(DomainError::Validation("Size Mismatch".to_string()));
                }
            }
        }

        session.begin_upload(Utc::now())?;
        self.uploads
            .update_session(&session)
            .await
            .map_err(transient)?;

        let written = self
            .blobs
            .put(session.temp_storage_key(), reader)
            .await
            .map_err(transient)?;

        let size_ok = written <= self.max_file_size_bytes
            && session
                .expected_size_bytes()
                .map_or(true, |expected| written == expected);
        if !size_ok {
            // Discard the bad temp blob; the session stays Uploading for a
            // retry or eventual expiry
            if let Err(e) = self.blobs.delete(session.temp_storage_key()).await {
                warn!(session_id = %session_id, error = %e, "Failed to discard temp blob");
            }
            return Err(DomainError::Validation("Size Mismatch".to_string()));
        }

        info!(session_id = %session_id, bytes = written, "Upload content stored");
        Ok(session)
    }

    /// Commits a session, producing the durable Source file
    pub async fn commit(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        session_id: UploadId,
    ) -> Result<CommitOutcome, DomainError> {
        self.gate.require_scope(principal, Scope::FilesWrite)?;
        let project = self.gate.project_in_scope(principal, project_id).await?;
        self.gate
            .require_project_role(principal, &project, ProjectRole::Editor)
            .await?;

        let mut session = self.load_session(project_id, session_id).await?;

        // Surface state errors (already committed, expired, no content on
        // a proxy session) before touching storage
        session.ensure_committable(Utc::now())?;

        let exists = self
            .blobs
            .exists(session.temp_storage_key())
            .await
            .map_err(transient)?;
        if !exists {
            session.fail()?;
            self.uploads
                .update_session(&session)
                .await
                .map_err(transient)?;
            return Err(DomainError::Validation(
                "No uploaded content found for this session".to_string(),
            ));
        }

        let actual_size = self
            .blobs
            .size(session.temp_storage_key())
            .await
            .map_err(transient)?;
        if let Some(expected) = session.expected_size_bytes() {
            if actual_size != expected {
                return Err(DomainError::Validation("Size Mismatch".to_string()));
            }
        }

        let category = FileCategory::from_file_name(session.file_name());
        let file = File::new(
            project_id,
            session.file_name(),
            session.content_type(),
            actual_size,
            None,
            FileKind::Source,
            category,
            self.blobs.provider_id(),
            session.temp_storage_key().clone(),
        );

        self.catalog.create_file(&file).await.map_err(transient)?;
        session.commit(file.id(), Utc::now())?;
        self.uploads
            .update_session(&session)
            .await
            .map_err(transient)?;

        info!(
            session_id = %session_id,
            file_id = %file.id(),
            category = %file.category(),
            "Upload committed"
        );
        Ok(CommitOutcome { session, file })
    }

    /// Loads a session, applies lazy expiry, and verifies it belongs to
    /// the addressed project
    async fn load_session(
        &self,
        project_id: ProjectId,
        session_id: UploadId,
    ) -> Result<UploadSession, DomainError> {
        let mut session = self
            .uploads
            .get_session(session_id)
            .await
            .map_err(transient)?
            .ok_or_else(|| DomainError::NotFound("upload session".to_string()))?;
        if session.project_id() != project_id {
            return Err(DomainError::NotFound("upload session".to_string()));
        }
        if session.check_expiry(Utc::now()) {
            self.uploads
                .update_session(&session)
                .await
                .map_err(transient)?;
        }
        Ok(session)
    }
}
