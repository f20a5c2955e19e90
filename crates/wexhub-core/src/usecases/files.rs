//! Artifact catalog use cases
//!
//! Listing, metadata reads, streamed downloads, soft deletion, and usage
//! aggregation. Reads are existence-masked: a caller without access to a
//! file's project sees NotFound, never Forbidden.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::domain::errors::DomainError;
use crate::domain::file::{File, StorageUsage};
use crate::domain::identity::{ProjectRole, WorkspaceRole};
use crate::domain::newtypes::{FileId, ProjectId, WorkspaceId};
use crate::domain::scope::{Principal, Scope};
use crate::ports::blob_store::BlobReader;
use crate::ports::{BlobStore, CatalogRepository, FileListFilter, Page, PageRequest};

use super::access::AccessGate;

fn transient(e: anyhow::Error) -> DomainError {
    DomainError::Transient(e.to_string())
}

/// A streamed download: the file row plus its content reader
pub struct FileDownload {
    pub file: File,
    pub reader: BlobReader,
}

/// Use case over the file catalog
pub struct FileCatalogService {
    gate: Arc<AccessGate>,
    catalog: Arc<dyn CatalogRepository>,
    blobs: Arc<dyn BlobStore>,
}

impl FileCatalogService {
    pub fn new(
        gate: Arc<AccessGate>,
        catalog: Arc<dyn CatalogRepository>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self { gate, catalog, blobs }
    }

    /// Lists a project's non-deleted files, newest first
    pub async fn list_files(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        filter: FileListFilter,
        page: PageRequest,
    ) -> Result<Page<File>, DomainError> {
        self.gate.require_scope(principal, Scope::FilesRead)?;
        let result: Result<Page<File>, DomainError> = async {
            let project = self.gate.project_in_scope(principal, project_id).await?;
            self.gate
                .require_project_role(principal, &project, ProjectRole::Viewer)
                .await?;
            self.catalog
                .list_files(project_id, filter, page)
                .await
                .map_err(transient)
        }
        .await;
        result.map_err(|e| e.masked("project"))
    }

    /// Retrieves file metadata by id; deleted files are visible here
    pub async fn get_file(
        &self,
        principal: &Principal,
        file_id: FileId,
    ) -> Result<File, DomainError> {
        self.gate.require_scope(principal, Scope::FilesRead)?;
        self.readable_file(principal, file_id).await
    }

    /// Streams a file's content; deleted files are not downloadable
    pub async fn download(
        &self,
        principal: &Principal,
        file_id: FileId,
    ) -> Result<FileDownload, DomainError> {
        self.gate.require_scope(principal, Scope::FilesRead)?;
        let file = self.readable_file(principal, file_id).await?;
        if file.is_deleted() {
            return Err(DomainError::NotFound("file".to_string()));
        }
        let reader = self
            .blobs
            .get(file.storage_key())
            .await
            .map_err(transient)?;
        Ok(FileDownload { file, reader })
    }

    /// Soft-deletes a file; requires Editor
    pub async fn soft_delete(
        &self,
        principal: &Principal,
        file_id: FileId,
    ) -> Result<File, DomainError> {
        self.gate.require_scope(principal, Scope::FilesWrite)?;
        let mut file = self
            .catalog
            .get_file(file_id)
            .await
            .map_err(transient)?
            .ok_or_else(|| DomainError::NotFound("file".to_string()))?;
        let project = self
            .gate
            .project_in_scope(principal, file.project_id())
            .await
            .map_err(|e| e.masked("file"))?;
        self.gate
            .require_project_role(principal, &project, ProjectRole::Editor)
            .await
            .map_err(|e| match e {
                DomainError::NotFound(_) => DomainError::NotFound("file".to_string()),
                other => other,
            })?;

        file.soft_delete()?;
        self.catalog.update_file(&file).await.map_err(transient)?;
        info!(file_id = %file_id, "File soft-deleted");
        Ok(file)
    }

    /// Aggregates usage over a project's non-deleted files
    pub async fn project_usage(
        &self,
        principal: &Principal,
        project_id: ProjectId,
    ) -> Result<StorageUsage, DomainError> {
        self.gate.require_scope(principal, Scope::ProjectsRead)?;
        let result: Result<StorageUsage, DomainError> = async {
            let project = self.gate.project_in_scope(principal, project_id).await?;
            self.gate
                .require_project_role(principal, &project, ProjectRole::Viewer)
                .await?;
            let totals = self
                .catalog
                .usage_for_project(project_id)
                .await
                .map_err(transient)?;
            Ok(StorageUsage {
                total_bytes: totals.total_bytes,
                file_count: totals.file_count,
                calculated_at: Utc::now(),
            })
        }
        .await;
        result.map_err(|e| e.masked("project"))
    }

    /// Aggregates usage over a workspace's non-deleted files
    pub async fn workspace_usage(
        &self,
        principal: &Principal,
        workspace_id: WorkspaceId,
    ) -> Result<StorageUsage, DomainError> {
        self.gate.require_scope(principal, Scope::WorkspacesRead)?;
        let result: Result<StorageUsage, DomainError> = async {
            self.gate.workspace_in_scope(principal, workspace_id).await?;
            self.gate
                .require_workspace_role(principal, workspace_id, WorkspaceRole::Member)
                .await?;
            let totals = self
                .catalog
                .usage_for_workspace(workspace_id)
                .await
                .map_err(transient)?;
            Ok(StorageUsage {
                total_bytes: totals.total_bytes,
                file_count: totals.file_count,
                calculated_at: Utc::now(),
            })
        }
        .await;
        result.map_err(|e| e.masked("workspace"))
    }

    /// Loads a file and checks Viewer access, masking everything to a
    /// file-level NotFound
    async fn readable_file(
        &self,
        principal: &Principal,
        file_id: FileId,
    ) -> Result<File, DomainError> {
        let result: Result<File, DomainError> = async {
            let file = self
                .catalog
                .get_file(file_id)
                .await
                .map_err(transient)?
                .ok_or_else(|| DomainError::NotFound("file".to_string()))?;
            let project = self
                .gate
                .project_in_scope(principal, file.project_id())
                .await?;
            self.gate
                .require_project_role(principal, &project, ProjectRole::Viewer)
                .await?;
            Ok(file)
        }
        .await;
        result.map_err(|e| e.masked("file"))
    }
}
