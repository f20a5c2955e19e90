//! Model and model-version entities
//!
//! A `ModelVersion` is the state-machine target of processing:
//! `Pending → Processing → {Ready, Failed}`, with `Ready` and `Failed`
//! terminal. Artifact links are non-null iff the version is Ready;
//! `error_message` is non-null only when Failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{FileId, ModelId, ProjectId, VersionId};

/// A named building model inside a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    id: ModelId,
    project_id: ProjectId,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl Model {
    pub fn new(
        project_id: ProjectId,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::Validation(
                "Model name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            id: ModelId::new(),
            project_id,
            name,
            description,
            created_at: Utc::now(),
        })
    }

    pub fn from_parts(
        id: ModelId,
        project_id: ProjectId,
        name: String,
        description: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            project_id,
            name,
            description,
            created_at,
        }
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
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
}

/// Processing status of a model version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    /// Enqueued, not yet picked up by a worker
    Pending,
    /// A worker is running the processing handlers
    Processing,
    /// Both artifacts produced and linked; terminal
    Ready,
    /// A handler failed; terminal, never retried
    Failed,
}

impl VersionStatus {
    /// Returns true for Ready and Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, VersionStatus::Ready | VersionStatus::Failed)
    }
}

impl std::fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VersionStatus::Pending => "pending",
            VersionStatus::Processing => "processing",
            VersionStatus::Ready => "ready",
            VersionStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// An immutable revision of a model, produced from one IFC source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    id: VersionId,
    model_id: ModelId,
    /// Monotonically increasing per model, starting at 1
    version_number: u32,
    ifc_file_id: FileId,
    status: VersionStatus,
    wexbim_file_id: Option<FileId>,
    properties_file_id: Option<FileId>,
    error_message: Option<String>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl ModelVersion {
    /// Creates a Pending version; the version number is assigned by the
    /// store under the per-model uniqueness constraint
    pub fn new(model_id: ModelId, version_number: u32, ifc_file_id: FileId) -> Self {
        Self {
            id: VersionId::new(),
            model_id,
            version_number,
            ifc_file_id,
            status: VersionStatus::Pending,
            wexbim_file_id: None,
            properties_file_id: None,
            error_message: None,
            processed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Reconstitutes a version from stored fields
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: VersionId,
        model_id: ModelId,
        version_number: u32,
        ifc_file_id: FileId,
        status: VersionStatus,
        wexbim_file_id: Option<FileId>,
        properties_file_id: Option<FileId>,
        error_message: Option<String>,
        processed_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            model_id,
            version_number,
            ifc_file_id,
            status,
            wexbim_file_id,
            properties_file_id,
            error_message,
            processed_at,
            created_at,
        }
    }

    pub fn id(&self) -> VersionId {
        self.id
    }

    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    pub fn version_number(&self) -> u32 {
        self.version_number
    }

    pub fn ifc_file_id(&self) -> FileId {
        self.ifc_file_id
    }

    pub fn status(&self) -> VersionStatus {
        self.status
    }

    pub fn wexbim_file_id(&self) -> Option<FileId> {
        self.wexbim_file_id
    }

    pub fn properties_file_id(&self) -> Option<FileId> {
        self.properties_file_id
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Pending → Processing, taken by the worker before dispatch
    pub fn start_processing(&mut self) -> Result<(), DomainError> {
        match self.status {
            VersionStatus::Pending => {
                self.status = VersionStatus::Processing;
                Ok(())
            }
            other => Err(DomainError::invalid_state(
                other.to_string(),
                VersionStatus::Processing.to_string(),
            )),
        }
    }

    /// Processing → Ready, linking both artifacts in one step
    ///
    /// Both links land together so readers never observe a Ready version
    /// with a missing artifact, nor a non-Ready version with one set.
    pub fn complete(
        &mut self,
        wexbim_file_id: FileId,
        properties_file_id: FileId,
    ) -> Result<(), DomainError> {
        match self.status {
            VersionStatus::Processing => {
                self.status = VersionStatus::Ready;
                self.wexbim_file_id = Some(wexbim_file_id);
                self.properties_file_id = Some(properties_file_id);
                self.error_message = None;
                self.processed_at = Some(Utc::now());
                Ok(())
            }
            other => Err(DomainError::invalid_state(
                other.to_string(),
                VersionStatus::Ready.to_string(),
            )),
        }
    }

    /// {Pending, Processing} → Failed with a sanitized message
    ///
    /// Pending is allowed so an unknown job type can be projected as a
    /// terminal failure without a Processing hop.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), DomainError> {
        match self.status {
            VersionStatus::Pending | VersionStatus::Processing => {
                self.status = VersionStatus::Failed;
                self.error_message = Some(message.into());
                self.processed_at = Some(Utc::now());
                Ok(())
            }
            other => Err(DomainError::invalid_state(
                other.to_string(),
                VersionStatus::Failed.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_version() -> ModelVersion {
        ModelVersion::new(ModelId::new(), 1, FileId::new())
    }

    #[test]
    fn test_new_version_is_pending() {
        let v = pending_version();
        assert_eq!(v.status(), VersionStatus::Pending);
        assert!(v.wexbim_file_id().is_none());
        assert!(v.properties_file_id().is_none());
        assert!(v.error_message().is_none());
        assert!(v.processed_at().is_none());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut v = pending_version();
        v.start_processing().unwrap();
        assert_eq!(v.status(), VersionStatus::Processing);

        let wexbim = FileId::new();
        let props = FileId::new();
        v.complete(wexbim, props).unwrap();
        assert_eq!(v.status(), VersionStatus::Ready);
        assert_eq!(v.wexbim_file_id(), Some(wexbim));
        assert_eq!(v.properties_file_id(), Some(props));
        assert!(v.error_message().is_none());
        assert!(v.processed_at().is_some());
    }

    #[test]
    fn test_complete_requires_processing() {
        let mut v = pending_version();
        assert!(v.complete(FileId::new(), FileId::new()).is_err());
    }

    #[test]
    fn test_fail_from_pending_and_processing() {
        let mut v = pending_version();
        v.fail("unknown job type").unwrap();
        assert_eq!(v.status(), VersionStatus::Failed);
        assert_eq!(v.error_message(), Some("unknown job type"));

        let mut v = pending_version();
        v.start_processing().unwrap();
        v.fail("translator crashed").unwrap();
        assert_eq!(v.status(), VersionStatus::Failed);
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut v = pending_version();
        v.start_processing().unwrap();
        v.complete(FileId::new(), FileId::new()).unwrap();
        assert!(v.start_processing().is_err());
        assert!(v.fail("late").is_err());

        let mut v = pending_version();
        v.start_processing().unwrap();
        v.fail("boom").unwrap();
        assert!(v.start_processing().is_err());
        assert!(v.complete(FileId::new(), FileId::new()).is_err());
    }

    #[test]
    fn test_model_name_validated() {
        assert!(Model::new(ProjectId::new(), "  ", None).is_err());
        assert!(Model::new(ProjectId::new(), "Tower A", None).is_ok());
    }
}
