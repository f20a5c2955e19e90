//! Model and version use cases
//!
//! Version creation is the entry point of the processing pipeline: it
//! validates the IFC source, lets the store allocate the next version
//! number atomically, and enqueues one job envelope per registered
//! processing step.

use std::sync::Arc;

use tracing::info;

use crate::domain::errors::DomainError;
use crate::domain::file::FileKind;
use crate::domain::identity::ProjectRole;
use crate::domain::job::{
    JobEnvelope, ProcessingPayload, JOB_TYPE_EXTRACT_PROPERTIES, JOB_TYPE_IFC_TO_WEXBIM,
};
use crate::domain::model::{Model, ModelVersion};
use crate::domain::newtypes::{FileId, ModelId, ProjectId, VersionId};
use crate::domain::scope::{Principal, Scope};
use crate::ports::blob_store::BlobReader;
use crate::ports::{BlobStore, CatalogRepository, JobQueue, Page, PageRequest, QueueError};

use super::access::AccessGate;

fn transient(e: anyhow::Error) -> DomainError {
    DomainError::Transient(e.to_string())
}

/// A streamed wexBIM artifact download
pub struct WexBimDownload {
    pub file: crate::domain::file::File,
    pub reader: BlobReader,
}

/// Use case for models, versions, and the processing handoff
pub struct ModelService {
    gate: Arc<AccessGate>,
    catalog: Arc<dyn CatalogRepository>,
    blobs: Arc<dyn BlobStore>,
    queue: Arc<dyn JobQueue>,
}

impl ModelService {
    pub fn new(
        gate: Arc<AccessGate>,
        catalog: Arc<dyn CatalogRepository>,
        blobs: Arc<dyn BlobStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            gate,
            catalog,
            blobs,
            queue,
        }
    }

    /// Creates a model; requires Editor
    pub async fn create_model(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        name: &str,
        description: Option<String>,
    ) -> Result<Model, DomainError> {
        self.gate.require_scope(principal, Scope::ModelsWrite)?;
        let project = self.gate.project_in_scope(principal, project_id).await?;
        self.gate
            .require_project_role(principal, &project, ProjectRole::Editor)
            .await?;

        let model = Model::new(project_id, name, description)?;
        self.catalog.create_model(&model).await.map_err(transient)?;
        info!(model_id = %model.id(), project_id = %project_id, "Model created");
        Ok(model)
    }

    /// Lists a project's models; requires Viewer
    pub async fn list_models(
        &self,
        principal: &Principal,
        project_id: ProjectId,
    ) -> Result<Vec<Model>, DomainError> {
        self.gate.require_scope(principal, Scope::ModelsRead)?;
        let result: Result<Vec<Model>, DomainError> = async {
            let project = self.gate.project_in_scope(principal, project_id).await?;
            self.gate
                .require_project_role(principal, &project, ProjectRole::Viewer)
                .await?;
            self.catalog.list_models(project_id).await.map_err(transient)
        }
        .await;
        result.map_err(|e| e.masked("project"))
    }

    /// Retrieves a model the caller can see
    pub async fn get_model(
        &self,
        principal: &Principal,
        model_id: ModelId,
    ) -> Result<Model, DomainError> {
        self.gate.require_scope(principal, Scope::ModelsRead)?;
        self.readable_model(principal, model_id).await
    }

    /// Creates a Pending version and enqueues its processing jobs
    ///
    /// The source must be a non-deleted `Source` file in the model's own
    /// project. A full queue surfaces as a transient failure (503); the
    /// version row stays Pending and is picked up once a supervisor
    /// re-enqueues it.
    pub async fn create_version(
        &self,
        principal: &Principal,
        model_id: ModelId,
        ifc_file_id: FileId,
    ) -> Result<ModelVersion, DomainError> {
        self.gate.require_scope(principal, Scope::ModelsWrite)?;
        let model = self.readable_model(principal, model_id).await?;
        let project = self
            .gate
            .project_in_scope(principal, model.project_id())
            .await?;
        self.gate
            .require_project_role(principal, &project, ProjectRole::Editor)
            .await?;

        let source = self
            .catalog
            .get_file(ifc_file_id)
            .await
            .map_err(transient)?
            .ok_or_else(|| DomainError::Validation("ifcFileId does not exist".to_string()))?;
        if source.project_id() != model.project_id()
            || source.is_deleted()
            || source.kind() != FileKind::Source
        {
            return Err(DomainError::Validation(
                "ifcFileId must reference a non-deleted source file in the same project"
                    .to_string(),
            ));
        }

        let version = self
            .catalog
            .create_version(model_id, ifc_file_id)
            .await
            .map_err(transient)?;

        let payload = ProcessingPayload {
            model_version_id: version.id(),
            ifc_file_id,
            workspace_id: project.workspace_id(),
            project_id: project.id(),
        };
        for job_type in [JOB_TYPE_IFC_TO_WEXBIM, JOB_TYPE_EXTRACT_PROPERTIES] {
            self.queue
                .enqueue(JobEnvelope::new(job_type, payload))
                .await
                .map_err(|e| match e {
                    QueueError::Full => {
                        DomainError::Transient("Processing queue is full".to_string())
                    }
                    QueueError::Closed => {
                        DomainError::Transient("Processing queue is closed".to_string())
                    }
                })?;
        }

        info!(
            version_id = %version.id(),
            model_id = %model_id,
            version_number = version.version_number(),
            "Model version created and enqueued"
        );
        Ok(version)
    }

    /// Lists a model's versions; requires Viewer
    pub async fn list_versions(
        &self,
        principal: &Principal,
        model_id: ModelId,
        page: PageRequest,
    ) -> Result<Page<ModelVersion>, DomainError> {
        self.gate.require_scope(principal, Scope::ModelsRead)?;
        self.readable_model(principal, model_id).await?;
        self.catalog
            .list_versions(model_id, page)
            .await
            .map_err(transient)
    }

    /// Retrieves a version for status polling
    pub async fn get_version(
        &self,
        principal: &Principal,
        version_id: VersionId,
    ) -> Result<ModelVersion, DomainError> {
        self.gate.require_scope(principal, Scope::ModelsRead)?;
        self.readable_version(principal, version_id).await
    }

    /// Streams the wexBIM artifact of a Ready version
    ///
    /// Every precondition miss (no version, no link, deleted artifact,
    /// missing blob) is a uniform 404; this endpoint never mutates state.
    pub async fn download_wexbim(
        &self,
        principal: &Principal,
        version_id: VersionId,
    ) -> Result<WexBimDownload, DomainError> {
        self.gate.require_scope(principal, Scope::ModelsRead)?;
        let version = self.readable_version(principal, version_id).await?;

        let not_found = || DomainError::NotFound("wexbim artifact".to_string());
        let file_id = version.wexbim_file_id().ok_or_else(not_found)?;
        let file = self
            .catalog
            .get_file(file_id)
            .await
            .map_err(transient)?
            .ok_or_else(not_found)?;
        if file.is_deleted() {
            return Err(not_found());
        }
        let exists = self
            .blobs
            .exists(file.storage_key())
            .await
            .map_err(transient)?;
        if !exists {
            return Err(not_found());
        }
        let reader = self
            .blobs
            .get(file.storage_key())
            .await
            .map_err(transient)?;
        Ok(WexBimDownload { file, reader })
    }

    /// Loads a model and checks Viewer access, masked to NotFound
    async fn readable_model(
        &self,
        principal: &Principal,
        model_id: ModelId,
    ) -> Result<Model, DomainError> {
        let result: Result<Model, DomainError> = async {
            let model = self
                .catalog
                .get_model(model_id)
                .await
                .map_err(transient)?
                .ok_or_else(|| DomainError::NotFound("model".to_string()))?;
            let project = self
                .gate
                .project_in_scope(principal, model.project_id())
                .await?;
            self.gate
                .require_project_role(principal, &project, ProjectRole::Viewer)
                .await?;
            Ok(model)
        }
        .await;
        result.map_err(|e| e.masked("model"))
    }

    /// Loads a version through its model's access path
    async fn readable_version(
        &self,
        principal: &Principal,
        version_id: VersionId,
    ) -> Result<ModelVersion, DomainError> {
        let result: Result<ModelVersion, DomainError> = async {
            let version = self
                .catalog
                .get_version(version_id)
                .await
                .map_err(transient)?
                .ok_or_else(|| DomainError::NotFound("model version".to_string()))?;
            self.readable_model(principal, version.model_id()).await?;
            Ok(version)
        }
        .await;
        result.map_err(|e| e.masked("model version"))
    }
}
