//! Worker loop
//!
//! Dequeues envelopes, enforces at-most-once dispatch, resolves handlers
//! by job type, and projects outcomes onto the model version:
//!
//! 1. Drop envelopes the tracker has seen.
//! 2. Unknown job type: terminal Failed, mark processed.
//! 3. Terminal versions are never re-dispatched.
//! 4. Pending → Processing before the first handler runs.
//! 5. Artifact links collect in worker memory; the version is persisted
//!    Ready in one write once both handlers returned, so readers never
//!    observe a half-linked row.
//! 6. A handler failure is terminal Failed with a sanitized message; no
//!    retry.
//! 7. Infrastructure failures (store I/O) re-enqueue the envelope and do
//!    not mark it processed.
//!
//! Shutdown is graceful: the in-flight envelope drains, idle dequeues
//! cancel.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use wexhub_core::domain::job::JobEnvelope;
use wexhub_core::domain::model::VersionStatus;
use wexhub_core::domain::newtypes::{FileId, VersionId};
use wexhub_core::ports::{
    ArtifactKind, CatalogRepository, JobQueue, ProcessedJobTracker,
};

use crate::registry::HandlerRegistry;

/// Longest error text recorded on a failed version
const MAX_ERROR_LEN: usize = 240;

/// Artifact links collected while a version's handlers are in flight
#[derive(Debug, Default, Clone, Copy)]
struct PartialLinks {
    wexbim: Option<FileId>,
    properties: Option<FileId>,
}

/// The dequeue/dispatch/project loop
pub struct Worker {
    queue: Arc<dyn JobQueue>,
    tracker: Arc<dyn ProcessedJobTracker>,
    catalog: Arc<dyn CatalogRepository>,
    registry: Arc<HandlerRegistry>,
    dequeue_timeout: Duration,
    /// Links waiting for their sibling handler, keyed by version
    pending_links: Arc<DashMap<VersionId, PartialLinks>>,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        tracker: Arc<dyn ProcessedJobTracker>,
        catalog: Arc<dyn CatalogRepository>,
        registry: Arc<HandlerRegistry>,
        dequeue_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            tracker,
            catalog,
            registry,
            dequeue_timeout,
            pending_links: Arc::new(DashMap::new()),
        }
    }

    /// Shares the link table with another worker task of the same pool
    ///
    /// Both handlers of a version may land on different workers; the
    /// completion decision needs one table across the pool.
    pub fn sharing_links_with(mut self, other: &Worker) -> Self {
        self.pending_links = Arc::clone(&other.pending_links);
        self
    }

    /// Runs until the token is cancelled; in-flight work drains first
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            job_types = ?self.registry.job_types(),
            "Worker started"
        );
        loop {
            let envelope = tokio::select! {
                _ = shutdown.cancelled() => break,
                maybe = self.queue.dequeue(self.dequeue_timeout) => maybe,
            };
            let Some(envelope) = envelope else {
                continue;
            };
            self.process_one(envelope).await;
        }
        info!("Worker stopped");
    }

    /// Handles one envelope end to end
    pub async fn process_one(&self, envelope: JobEnvelope) {
        let job_id = envelope.job_id();
        let version_id = envelope.payload().model_version_id;

        if self.tracker.already_processed(job_id) {
            debug!(job_id = %job_id, "Envelope already dispatched, dropping");
            return;
        }

        // Unknown type: permanent failure of the target version
        let Some(handler) = self.registry.get(envelope.job_type()) else {
            warn!(job_id = %job_id, job_type = envelope.job_type(), "Unknown job type");
            self.tracker.mark_processed(job_id);
            self.fail_version(version_id, "unknown job type").await;
            return;
        };

        // Load the version; store errors leave the job re-deliverable
        let version = match self.catalog.get_version(version_id).await {
            Ok(Some(version)) => version,
            Ok(None) => {
                warn!(job_id = %job_id, version_id = %version_id, "Version row missing");
                self.tracker.mark_processed(job_id);
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to load version");
                self.requeue(envelope).await;
                return;
            }
        };

        // Ready/Failed versions are never re-dispatched
        if version.status().is_terminal() {
            debug!(version_id = %version_id, status = %version.status(), "Version terminal, dropping");
            self.tracker.mark_processed(job_id);
            return;
        }

        // First envelope of the pair takes Pending → Processing
        if version.status() == VersionStatus::Pending {
            let mut version = version;
            if let Err(e) = version.start_processing() {
                warn!(version_id = %version_id, error = %e, "Start transition rejected");
                self.tracker.mark_processed(job_id);
                return;
            }
            if let Err(e) = self.catalog.update_version(&version).await {
                error!(job_id = %job_id, error = %e, "Failed to persist Processing");
                self.requeue(envelope).await;
                return;
            }
        }

        // Dispatch exactly once from here, whatever the outcome
        self.tracker.mark_processed(job_id);
        debug!(job_id = %job_id, job_type = envelope.job_type(), "Dispatching handler");

        match handler.run(&envelope).await {
            Ok(artifact) => {
                let links = {
                    let mut entry = self.pending_links.entry(version_id).or_default();
                    match artifact.kind {
                        ArtifactKind::WexBim => entry.wexbim = Some(artifact.file_id),
                        ArtifactKind::Properties => entry.properties = Some(artifact.file_id),
                    }
                    *entry
                };
                if let (Some(wexbim), Some(properties)) = (links.wexbim, links.properties) {
                    self.complete_version(version_id, wexbim, properties).await;
                    self.pending_links.remove(&version_id);
                }
            }
            Err(e) => {
                warn!(job_id = %job_id, version_id = %version_id, error = %e, "Handler failed");
                self.pending_links.remove(&version_id);
                self.fail_version(version_id, &sanitize_error(&e)).await;
            }
        }
    }

    /// Projects Ready with both links in a single write
    async fn complete_version(&self, version_id: VersionId, wexbim: FileId, properties: FileId) {
        let version = match self.catalog.get_version(version_id).await {
            Ok(Some(version)) => version,
            Ok(None) => return,
            Err(e) => {
                error!(version_id = %version_id, error = %e, "Failed to reload version");
                return;
            }
        };
        if version.status().is_terminal() {
            // A failed sibling already closed this version
            return;
        }
        let mut version = version;
        if let Err(e) = version.complete(wexbim, properties) {
            warn!(version_id = %version_id, error = %e, "Complete transition rejected");
            return;
        }
        if let Err(e) = self.catalog.update_version(&version).await {
            error!(version_id = %version_id, error = %e, "Failed to persist Ready");
            return;
        }
        info!(version_id = %version_id, "Model version ready");
    }

    /// Projects a terminal failure; late or repeated failures only log
    async fn fail_version(&self, version_id: VersionId, message: &str) {
        let version = match self.catalog.get_version(version_id).await {
            Ok(Some(version)) => version,
            Ok(None) => return,
            Err(e) => {
                error!(version_id = %version_id, error = %e, "Failed to reload version");
                return;
            }
        };
        if version.status().is_terminal() {
            return;
        }
        let mut version = version;
        if let Err(e) = version.fail(message) {
            warn!(version_id = %version_id, error = %e, "Fail transition rejected");
            return;
        }
        if let Err(e) = self.catalog.update_version(&version).await {
            error!(version_id = %version_id, error = %e, "Failed to persist Failed");
            return;
        }
        info!(version_id = %version_id, message, "Model version failed");
    }

    /// Puts an envelope back after an infrastructure error
    async fn requeue(&self, envelope: JobEnvelope) {
        let job_id = envelope.job_id();
        if let Err(e) = self.queue.enqueue(envelope).await {
            error!(job_id = %job_id, error = %e, "Failed to requeue envelope");
        }
    }
}

/// Trims handler errors to a client-safe, bounded message
///
/// Only the outermost context line survives; inner causes may carry
/// paths or connection strings that must not reach clients.
fn sanitize_error(error: &anyhow::Error) -> String {
    let first_line = error.to_string();
    let first_line = first_line.lines().next().unwrap_or("processing failed");
    let mut message = first_line.trim().to_string();
    if message.is_empty() {
        message = "processing failed".to_string();
    }
    if message.len() > MAX_ERROR_LEN {
        message.truncate(MAX_ERROR_LEN);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_error_takes_first_line_only() {
        let error = anyhow::anyhow!("top: failed\nsecret: /var/lib/wexhub/blobs");
        assert_eq!(sanitize_error(&error), "top: failed");
    }

    #[test]
    fn test_sanitize_error_bounds_length() {
        let error = anyhow::anyhow!("{}", "x".repeat(1000));
        assert_eq!(sanitize_error(&error).len(), MAX_ERROR_LEN);
    }

    #[test]
    fn test_sanitize_error_never_empty() {
        let error = anyhow::anyhow!("");
        assert_eq!(sanitize_error(&error), "processing failed");
    }
}
