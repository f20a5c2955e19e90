//! Catalog repository port (driven/secondary port)
//!
//! Persistence for files, models, model versions, extracted properties,
//! and usage aggregation.

use crate::domain::file::{File, FileCategory, FileKind};
use crate::domain::model::{Model, ModelVersion};
use crate::domain::newtypes::{FileId, ModelId, ProjectId, UniqueId, VersionId, WorkspaceId};
use crate::domain::properties::{ElementProperties, IfcElement, PropertyFilter};

/// Largest admitted page size
pub const MAX_PAGE_SIZE: u32 = 100;

/// Default page size when the caller specifies none
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// A clamped paging request
///
/// `page` is 1-based and clamped to at least 1; `page_size` is clamped to
/// `[1, 100]` with a default of 20.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    /// Builds a request, clamping out-of-range values
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let page_size = page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        Self { page, page_size }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Row offset of the first item on this page
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of query results
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
}

impl<T> Page<T> {
    /// Wraps a result page, echoing the clamped request
    pub fn new(items: Vec<T>, request: PageRequest, total_count: u64) -> Self {
        Self {
            items,
            page: request.page(),
            page_size: request.page_size(),
            total_count,
        }
    }
}

/// Filter criteria for file listings; `None` fields match everything
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileListFilter {
    pub kind: Option<FileKind>,
    pub category: Option<FileCategory>,
}

/// Raw usage numbers before stamping `calculated_at`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageTotals {
    pub total_bytes: u64,
    pub file_count: u64,
}

/// Port trait for catalog persistence
#[async_trait::async_trait]
pub trait CatalogRepository: Send + Sync {
    // --- File operations ---

    /// Inserts a file record
    async fn create_file(&self, file: &File) -> anyhow::Result<()>;

    /// Retrieves a file by id, deleted or not
    async fn get_file(&self, id: FileId) -> anyhow::Result<Option<File>>;

    /// Updates a file record (soft-delete flags)
    async fn update_file(&self, file: &File) -> anyhow::Result<()>;

    /// Lists non-deleted files of a project, newest first
    async fn list_files(
        &self,
        project_id: ProjectId,
        filter: FileListFilter,
        page: PageRequest,
    ) -> anyhow::Result<Page<File>>;

    /// Sums size and count over the non-deleted files of a project
    async fn usage_for_project(&self, project_id: ProjectId) -> anyhow::Result<UsageTotals>;

    /// Sums size and count over the non-deleted files of a workspace
    async fn usage_for_workspace(&self, workspace_id: WorkspaceId)
        -> anyhow::Result<UsageTotals>;

    // --- Model operations ---

    /// Inserts a model
    async fn create_model(&self, model: &Model) -> anyhow::Result<()>;

    /// Retrieves a model by id
    async fn get_model(&self, id: ModelId) -> anyhow::Result<Option<Model>>;

    /// Lists a project's models, newest first
    async fn list_models(&self, project_id: ProjectId) -> anyhow::Result<Vec<Model>>;

    // --- Version operations ---

    /// Atomically assigns `version_number = max(existing) + 1` and inserts
    /// a Pending version
    ///
    /// The allocation and insert run in one transaction so concurrent
    /// creations never share a number.
    async fn create_version(
        &self,
        model_id: ModelId,
        ifc_file_id: FileId,
    ) -> anyhow::Result<ModelVersion>;

    /// Retrieves a version by id
    async fn get_version(&self, id: VersionId) -> anyhow::Result<Option<ModelVersion>>;

    /// Lists a model's versions, highest version number first
    async fn list_versions(
        &self,
        model_id: ModelId,
        page: PageRequest,
    ) -> anyhow::Result<Page<ModelVersion>>;

    /// Persists a version's status projection
    async fn update_version(&self, version: &ModelVersion) -> anyhow::Result<()>;

    // --- Extracted property operations ---

    /// Replaces the extracted rows of a version with `elements`
    async fn replace_elements(
        &self,
        version_id: VersionId,
        elements: &[ElementProperties],
    ) -> anyhow::Result<()>;

    /// Queries extracted elements with the aggregation filter
    async fn query_elements(
        &self,
        version_id: VersionId,
        filter: &PropertyFilter,
        page: PageRequest,
    ) -> anyhow::Result<Page<IfcElement>>;

    /// Retrieves one element with its property and quantity sets
    async fn get_element_properties(
        &self,
        version_id: VersionId,
        element_id: UniqueId,
    ) -> anyhow::Result<Option<ElementProperties>>;
}
