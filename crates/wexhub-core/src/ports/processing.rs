//! Processing handler ports (driven/secondary ports)
//!
//! The IFC translators are opaque collaborators: geometry translation and
//! property extraction are CPU-heavy library calls behind these traits.
//! The pipeline crate invokes them from worker tasks; adapters decide how
//! the work actually runs.

use crate::domain::job::JobEnvelope;
use crate::domain::newtypes::FileId;
use crate::domain::properties::ElementProperties;

/// Which artifact slot of a model version a handler filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    WexBim,
    Properties,
}

/// The artifact a successful handler run produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerArtifact {
    pub kind: ArtifactKind,
    pub file_id: FileId,
}

/// A registered processing handler, keyed by job type
///
/// Dispatch is by registry lookup, not inheritance: the worker resolves
/// the envelope's `job_type` to one of these values. A handler uploads its
/// artifact, persists whatever rows it extracts, and returns the artifact
/// link; the worker owns the status projection onto the model version.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type string this handler is registered under
    fn job_type(&self) -> &str;

    /// Runs the handler for one envelope
    async fn run(&self, envelope: &JobEnvelope) -> anyhow::Result<HandlerArtifact>;
}

/// Output of a property extraction run
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// Structured rows to persist for the aggregation queries
    pub elements: Vec<ElementProperties>,
    /// The packed extracted-properties artifact to upload
    pub properties_blob: Vec<u8>,
}

/// Port trait for IFC → wexBIM geometry translation
#[async_trait::async_trait]
pub trait GeometryTranslator: Send + Sync {
    /// Translates IFC source bytes into wexBIM viewer geometry
    async fn translate(&self, ifc: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// Port trait for IFC property extraction
#[async_trait::async_trait]
pub trait PropertyExtractor: Send + Sync {
    /// Extracts elements, property sets, and quantities from IFC source
    /// bytes, along with the packed properties artifact
    async fn extract(&self, ifc: &[u8]) -> anyhow::Result<ExtractionOutcome>;
}
