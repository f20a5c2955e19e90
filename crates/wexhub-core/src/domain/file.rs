//! File catalog entities
//!
//! A `File` row describes either an uploaded source or a processing
//! artifact. Deletion is soft: deleted files disappear from listings and
//! usage aggregation but remain reachable by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{FileId, ProjectId, StorageKey};

/// Whether a file was uploaded or produced by processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Source,
    Artifact,
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileKind::Source => "source",
            FileKind::Artifact => "artifact",
        };
        write!(f, "{s}")
    }
}

/// Content category, derived from the file extension at commit time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Ifc,
    WexBim,
    Properties,
    Other,
}

impl FileCategory {
    /// Derives the category from a file name's lowercased extension
    ///
    /// `.ifc`, `.ifcxml` and `.ifczip` are IFC sources; `.wexbim` is viewer
    /// geometry; everything else is Other. Properties artifacts are tagged
    /// explicitly by the processing handler, never derived.
    pub fn from_file_name(name: &str) -> Self {
        match extension_of(name).as_deref() {
            Some(".ifc") | Some(".ifcxml") | Some(".ifczip") => FileCategory::Ifc,
            Some(".wexbim") => FileCategory::WexBim,
            _ => FileCategory::Other,
        }
    }
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileCategory::Ifc => "ifc",
            FileCategory::WexBim => "wexbim",
            FileCategory::Properties => "properties",
            FileCategory::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// Returns the lowercased extension of `name` including the leading dot,
/// or `None` when there is no extension.
pub fn extension_of(name: &str) -> Option<String> {
    let idx = name.rfind('.')?;
    if idx == 0 || idx == name.len() - 1 {
        return None;
    }
    Some(name[idx..].to_lowercase())
}

/// A stored file: uploaded source material or a processing artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    id: FileId,
    project_id: ProjectId,
    name: String,
    content_type: String,
    size_bytes: u64,
    checksum: Option<String>,
    kind: FileKind,
    category: FileCategory,
    storage_provider: String,
    storage_key: StorageKey,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl File {
    /// Creates a new file record
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_id: ProjectId,
        name: impl Into<String>,
        content_type: impl Into<String>,
        size_bytes: u64,
        checksum: Option<String>,
        kind: FileKind,
        category: FileCategory,
        storage_provider: impl Into<String>,
        storage_key: StorageKey,
    ) -> Self {
        Self {
            id: FileId::new(),
            project_id,
            name: name.into(),
            content_type: content_type.into(),
            size_bytes,
            checksum,
            kind,
            category,
            storage_provider: storage_provider.into(),
            storage_key,
            is_deleted: false,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    /// Reconstitutes a file from stored fields
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: FileId,
        project_id: ProjectId,
        name: String,
        content_type: String,
        size_bytes: u64,
        checksum: Option<String>,
        kind: FileKind,
        category: FileCategory,
        storage_provider: String,
        storage_key: StorageKey,
        is_deleted: bool,
        created_at: DateTime<Utc>,
        deleted_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            project_id,
            name,
            content_type,
            size_bytes,
            checksum,
            kind,
            category,
            storage_provider,
            storage_key,
            is_deleted,
            created_at,
            deleted_at,
        }
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Content type for downloads; empty falls back to octet-stream at the
    /// surface
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn category(&self) -> FileCategory {
        self.category
    }

    pub fn storage_provider(&self) -> &str {
        &self.storage_provider
    }

    pub fn storage_key(&self) -> &StorageKey {
        &self.storage_key
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Soft-deletes the file; rejected when already deleted
    pub fn soft_delete(&mut self) -> Result<(), DomainError> {
        if self.is_deleted {
            return Err(DomainError::invalid_state("deleted", "deleted"));
        }
        self.is_deleted = true;
        self.deleted_at = Some(Utc::now());
        Ok(())
    }
}

/// Aggregated storage usage over the non-deleted files of a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUsage {
    /// Sum of `size_bytes` over non-deleted files
    pub total_bytes: u64,
    /// Number of non-deleted files
    pub file_count: u64,
    /// When the aggregation was computed
    pub calculated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> File {
        File::new(
            ProjectId::new(),
            "SampleHouse.ifc",
            "application/x-step",
            1024,
            None,
            FileKind::Source,
            FileCategory::Ifc,
            "fs",
            StorageKey::new("ws/proj/uploads/abc.ifc").unwrap(),
        )
    }

    #[test]
    fn test_category_from_extension() {
        assert_eq!(FileCategory::from_file_name("house.ifc"), FileCategory::Ifc);
        assert_eq!(FileCategory::from_file_name("House.IFC"), FileCategory::Ifc);
        assert_eq!(
            FileCategory::from_file_name("model.ifcxml"),
            FileCategory::Ifc
        );
        assert_eq!(
            FileCategory::from_file_name("model.ifczip"),
            FileCategory::Ifc
        );
        assert_eq!(
            FileCategory::from_file_name("geo.wexbim"),
            FileCategory::WexBim
        );
        assert_eq!(
            FileCategory::from_file_name("notes.txt"),
            FileCategory::Other
        );
        assert_eq!(FileCategory::from_file_name("no-extension"), FileCategory::Other);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a.IFC").as_deref(), Some(".ifc"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some(".gz"));
        assert_eq!(extension_of("none"), None);
        assert_eq!(extension_of(".hidden"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn test_soft_delete_once() {
        let mut file = sample_file();
        assert!(!file.is_deleted());
        file.soft_delete().unwrap();
        assert!(file.is_deleted());
        assert!(file.deleted_at().is_some());
        // A second delete is a state error
        assert!(file.soft_delete().is_err());
    }
}
