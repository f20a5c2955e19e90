//! Processing job envelopes
//!
//! A version creation enqueues one envelope per registered job type. The
//! worker dispatches each envelope at most once, keyed by `job_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{FileId, JobId, ProjectId, VersionId, WorkspaceId};

/// Job type handled by the geometry translation handler
pub const JOB_TYPE_IFC_TO_WEXBIM: &str = "ifc_to_wexbim";

/// Job type handled by the property extraction handler
pub const JOB_TYPE_EXTRACT_PROPERTIES: &str = "extract_properties";

/// Everything a processing handler needs to locate its input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingPayload {
    pub model_version_id: VersionId,
    pub ifc_file_id: FileId,
    pub workspace_id: WorkspaceId,
    pub project_id: ProjectId,
}

/// A typed job envelope flowing through the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEnvelope {
    job_id: JobId,
    /// Registry key used to pick the handler
    job_type: String,
    payload: ProcessingPayload,
    attempt: u32,
    enqueued_at: DateTime<Utc>,
}

impl JobEnvelope {
    /// Creates a first-attempt envelope
    pub fn new(job_type: impl Into<String>, payload: ProcessingPayload) -> Self {
        Self {
            job_id: JobId::new(),
            job_type: job_type.into(),
            payload,
            attempt: 1,
            enqueued_at: Utc::now(),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn payload(&self) -> &ProcessingPayload {
        &self.payload
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }
}
