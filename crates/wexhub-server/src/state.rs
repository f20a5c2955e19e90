//! Process wiring
//!
//! Builds every service once at startup and hands the HTTP layer one
//! shared [`AppState`]. The queue, the idempotency tracker, the rate
//! limiter windows, and the JWT signing key all live here for the
//! process lifetime.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use wexhub_audit::AuditRecorder;
use wexhub_auth::apps::AppService;
use wexhub_auth::{BearerAuthenticator, OAuthService, PatService, TokenIssuer};
use wexhub_blob::FsBlobStore;
use wexhub_core::config::Config;
use wexhub_core::ports::{
    BlobStore, GeometryTranslator, JobQueue, PropertyExtractor,
};
use wexhub_core::usecases::{
    AccessGate, FileCatalogService, ModelService, ProjectService, PropertiesService,
    UploadService, WorkspaceService,
};
use wexhub_pipeline::{
    HandlerRegistry, InMemoryJobQueue, ProcessedJobs, PropertyExtractionHandler,
    StubGeometryTranslator, StubPropertyExtractor, WexBimConversionHandler, Worker,
};
use wexhub_store::{DatabasePool, SqliteStore};

use crate::http::rate_limit::FixedWindowLimiter;

/// Everything a request handler can reach
pub struct AppState {
    pub config: Config,
    pub authenticator: Arc<BearerAuthenticator>,
    pub issuer: Arc<TokenIssuer>,
    pub oauth: Arc<OAuthService>,
    pub apps: Arc<AppService>,
    pub pats: Arc<PatService>,
    pub workspaces: Arc<WorkspaceService>,
    pub projects: Arc<ProjectService>,
    pub uploads: Arc<UploadService>,
    pub files: Arc<FileCatalogService>,
    pub models: Arc<ModelService>,
    pub properties: Arc<PropertiesService>,
    pub blobs: Arc<dyn BlobStore>,
    pub limiter: Arc<FixedWindowLimiter>,
    workers: Vec<Worker>,
}

impl AppState {
    /// Spawns the worker pool; returns the join handles for draining
    pub fn spawn_workers(
        &mut self,
        shutdown: CancellationToken,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        self.workers
            .drain(..)
            .map(|worker| {
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker.run(shutdown).await })
            })
            .collect()
    }
}

/// Builds the full dependency graph from configuration
///
/// The translators default to the in-process stubs; a deployment with
/// the real geometry engine swaps them here.
pub async fn build_state(config: Config) -> anyhow::Result<AppState> {
    build_state_with_translators(
        config,
        Arc::new(StubGeometryTranslator),
        Arc::new(StubPropertyExtractor),
    )
    .await
}

/// Builds the dependency graph with explicit translator adapters
pub async fn build_state_with_translators(
    config: Config,
    translator: Arc<dyn GeometryTranslator>,
    extractor: Arc<dyn PropertyExtractor>,
) -> anyhow::Result<AppState> {
    let pool = DatabasePool::new(std::path::Path::new(&config.database.path))
        .await
        .context("Failed to open the database")?;
    let store = Arc::new(SqliteStore::new(pool.pool().clone()));
    let blobs: Arc<dyn BlobStore> = Arc::new(
        FsBlobStore::new(&config.storage.root).context("Failed to open the blob root")?,
    );
    build_state_with(config, store, blobs, translator, extractor)
}

/// Wires services over already-constructed adapters (also the test path)
pub fn build_state_with(
    config: Config,
    store: Arc<SqliteStore>,
    blobs: Arc<dyn BlobStore>,
    translator: Arc<dyn GeometryTranslator>,
    extractor: Arc<dyn PropertyExtractor>,
) -> anyhow::Result<AppState> {
    let issuer = Arc::new(TokenIssuer::new(
        config.auth.jwt_secret.as_bytes(),
        config.auth.issuer.clone(),
        config.auth.access_token_ttl_secs,
    ));
    let gate = Arc::new(AccessGate::new(store.clone()));
    let recorder = Arc::new(AuditRecorder::new(store.clone()));

    let oauth = Arc::new(OAuthService::new(
        store.clone(),
        store.clone(),
        issuer.clone(),
        config.auth.refresh_token_ttl_days,
    ));
    let apps = Arc::new(AppService::new(store.clone(), recorder.clone(), gate.clone()));
    let pats = Arc::new(PatService::new(
        store.clone(),
        recorder,
        store.clone(),
        gate.clone(),
    ));
    let authenticator = Arc::new(BearerAuthenticator::new(
        issuer.clone(),
        pats.clone(),
        store.clone(),
    ));

    let workspaces = Arc::new(WorkspaceService::new(store.clone(), gate.clone()));
    let projects = Arc::new(ProjectService::new(store.clone(), gate.clone()));
    let uploads = Arc::new(UploadService::new(
        gate.clone(),
        store.clone(),
        store.clone(),
        blobs.clone(),
        config.uploads.max_file_size_bytes,
    ));
    let files = Arc::new(FileCatalogService::new(
        gate.clone(),
        store.clone(),
        blobs.clone(),
    ));

    let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new(config.processing.queue_capacity));
    let tracker = Arc::new(ProcessedJobs::new());
    let models = Arc::new(ModelService::new(
        gate.clone(),
        store.clone(),
        blobs.clone(),
        queue.clone(),
    ));
    let properties = Arc::new(PropertiesService::new(gate, store.clone()));

    let registry = Arc::new(
        HandlerRegistry::new()
            .register(Arc::new(WexBimConversionHandler::new(
                store.clone(),
                blobs.clone(),
                translator,
            )))
            .register(Arc::new(PropertyExtractionHandler::new(
                store.clone(),
                blobs.clone(),
                extractor,
            ))),
    );
    let dequeue_timeout = Duration::from_secs(config.processing.dequeue_timeout_secs);
    let mut workers = Vec::with_capacity(config.processing.worker_count);
    for _ in 0..config.processing.worker_count {
        let worker = Worker::new(
            queue.clone(),
            tracker.clone(),
            store.clone(),
            registry.clone(),
            dequeue_timeout,
        );
        // All workers of the pool share one artifact-link table
        let worker = match workers.first() {
            Some(first) => worker.sharing_links_with(first),
            None => worker,
        };
        workers.push(worker);
    }

    let limiter = Arc::new(FixedWindowLimiter::new(config.rate_limits.clone()));

    Ok(AppState {
        config,
        authenticator,
        issuer,
        oauth,
        apps,
        pats,
        workspaces,
        projects,
        uploads,
        files,
        models,
        properties,
        blobs,
        limiter,
        workers,
    })
}
