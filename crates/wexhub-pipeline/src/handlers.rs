//! The two processing handlers
//!
//! Each handler downloads the IFC source, runs its opaque translator,
//! uploads the produced artifact under the deterministic artifact key,
//! inserts the artifact `File` row, and returns the link. Status
//! projection onto the model version belongs to the worker, not here.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use wexhub_core::domain::file::{File, FileCategory, FileKind};
use wexhub_core::domain::job::{
    JobEnvelope, JOB_TYPE_EXTRACT_PROPERTIES, JOB_TYPE_IFC_TO_WEXBIM,
};
use wexhub_core::domain::newtypes::StorageKey;
use wexhub_core::ports::blob_store::BlobReader;
use wexhub_core::ports::{
    ArtifactKind, BlobStore, CatalogRepository, GeometryTranslator, HandlerArtifact,
    JobHandler, PropertyExtractor,
};

/// Reads the source IFC bytes an envelope points at
async fn fetch_source(
    catalog: &dyn CatalogRepository,
    blobs: &dyn BlobStore,
    envelope: &JobEnvelope,
) -> anyhow::Result<Vec<u8>> {
    let payload = envelope.payload();
    let file = catalog
        .get_file(payload.ifc_file_id)
        .await?
        .context("Source file row disappeared")?;
    anyhow::ensure!(!file.is_deleted(), "Source file was deleted");
    blobs
        .get_bytes(file.storage_key())
        .await
        .context("Failed to download source IFC")
}

/// Uploads an artifact and records its `File` row
async fn store_artifact(
    catalog: &dyn CatalogRepository,
    blobs: &dyn BlobStore,
    envelope: &JobEnvelope,
    suffix: &str,
    category: FileCategory,
    content_type: &str,
    bytes: Vec<u8>,
) -> anyhow::Result<File> {
    let payload = envelope.payload();
    let key = StorageKey::for_artifact(
        payload.workspace_id,
        payload.project_id,
        payload.model_version_id,
        suffix,
    );
    let size = bytes.len() as u64;
    let mut reader: BlobReader = Box::new(std::io::Cursor::new(bytes));
    blobs
        .put(&key, &mut reader)
        .await
        .context("Failed to upload artifact")?;

    let file = File::new(
        payload.project_id,
        format!("{}{suffix}", payload.model_version_id),
        content_type,
        size,
        None,
        FileKind::Artifact,
        category,
        blobs.provider_id(),
        key,
    );
    catalog
        .create_file(&file)
        .await
        .context("Failed to record artifact file")?;
    Ok(file)
}

/// Converts the IFC source into wexBIM viewer geometry
pub struct WexBimConversionHandler {
    catalog: Arc<dyn CatalogRepository>,
    blobs: Arc<dyn BlobStore>,
    translator: Arc<dyn GeometryTranslator>,
}

impl WexBimConversionHandler {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        blobs: Arc<dyn BlobStore>,
        translator: Arc<dyn GeometryTranslator>,
    ) -> Self {
        Self {
            catalog,
            blobs,
            translator,
        }
    }
}

#[async_trait::async_trait]
impl JobHandler for WexBimConversionHandler {
    fn job_type(&self) -> &str {
        JOB_TYPE_IFC_TO_WEXBIM
    }

    async fn run(&self, envelope: &JobEnvelope) -> anyhow::Result<HandlerArtifact> {
        let ifc = fetch_source(self.catalog.as_ref(), self.blobs.as_ref(), envelope).await?;
        let wexbim = self
            .translator
            .translate(&ifc)
            .await
            .context("Geometry translation failed")?;
        let file = store_artifact(
            self.catalog.as_ref(),
            self.blobs.as_ref(),
            envelope,
            ".wexbim",
            FileCategory::WexBim,
            "application/octet-stream",
            wexbim,
        )
        .await?;

        info!(
            version_id = %envelope.payload().model_version_id,
            file_id = %file.id(),
            "wexBIM artifact produced"
        );
        Ok(HandlerArtifact {
            kind: ArtifactKind::WexBim,
            file_id: file.id(),
        })
    }
}

/// Extracts elements, property sets, and quantities from the IFC source
pub struct PropertyExtractionHandler {
    catalog: Arc<dyn CatalogRepository>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<dyn PropertyExtractor>,
}

impl PropertyExtractionHandler {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn PropertyExtractor>,
    ) -> Self {
        Self {
            catalog,
            blobs,
            extractor,
        }
    }
}

#[async_trait::async_trait]
impl JobHandler for PropertyExtractionHandler {
    fn job_type(&self) -> &str {
        JOB_TYPE_EXTRACT_PROPERTIES
    }

    async fn run(&self, envelope: &JobEnvelope) -> anyhow::Result<HandlerArtifact> {
        let ifc = fetch_source(self.catalog.as_ref(), self.blobs.as_ref(), envelope).await?;
        let outcome = self
            .extractor
            .extract(&ifc)
            .await
            .context("Property extraction failed")?;

        self.catalog
            .replace_elements(envelope.payload().model_version_id, &outcome.elements)
            .await
            .context("Failed to persist extracted elements")?;

        let file = store_artifact(
            self.catalog.as_ref(),
            self.blobs.as_ref(),
            envelope,
            ".properties.db",
            FileCategory::Properties,
            "application/octet-stream",
            outcome.properties_blob,
        )
        .await?;

        info!(
            version_id = %envelope.payload().model_version_id,
            file_id = %file.id(),
            elements = outcome.elements.len(),
            "Properties artifact produced"
        );
        Ok(HandlerArtifact {
            kind: ArtifactKind::Properties,
            file_id: file.id(),
        })
    }
}
