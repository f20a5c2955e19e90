//! Port definitions (trait interfaces for adapters)
//!
//! Driven ports implemented by adapter crates: blob storage, the
//! relational repositories, the processing queue, and the opaque IFC
//! translators. Use cases depend only on these traits.

pub mod audit_repository;
pub mod blob_store;
pub mod catalog_repository;
pub mod identity_repository;
pub mod job_queue;
pub mod processing;
pub mod token_repository;
pub mod upload_repository;

pub use audit_repository::AuditRepository;
pub use blob_store::{BlobHealth, BlobReader, BlobStore, PresignedUpload};
pub use catalog_repository::{
    CatalogRepository, FileListFilter, Page, PageRequest, UsageTotals, DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE,
};
pub use identity_repository::IdentityRepository;
pub use job_queue::{JobQueue, ProcessedJobTracker, QueueError};
pub use processing::{
    ArtifactKind, ExtractionOutcome, GeometryTranslator, HandlerArtifact, JobHandler,
    PropertyExtractor,
};
pub use token_repository::{OAuthRepository, PatRepository};
pub use upload_repository::UploadRepository;
