//! End-to-end scenarios through the full service stack
//!
//! SQLite in memory, blobs in a tempdir, stub translators, a real worker
//! task. Drives the reserve → content → commit → version → process →
//! download chain and the cross-cutting guards around it.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use wexhub_core::config::Config;
use wexhub_core::domain::errors::DomainError;
use wexhub_core::domain::file::{FileCategory, FileKind};
use wexhub_core::domain::identity::{Project, Workspace};
use wexhub_core::domain::model::VersionStatus;
use wexhub_core::domain::scope::{Principal, Scope, ScopeSet};
use wexhub_core::ports::blob_store::BlobReader;
use wexhub_core::usecases::ReserveRequest;
use wexhub_pipeline::{StubGeometryTranslator, StubPropertyExtractor};
use wexhub_server::{build_state_with, AppState};
use wexhub_store::{DatabasePool, SqliteStore};

const SAMPLE_IFC: &[u8] =
    b"ISO-10303-21;\n#1=IFCPROJECT('guid',$);\n#2=IFCWALL('g2',$);\nEND-ISO-10303-21;\n";

struct TestEnv {
    _dir: tempfile::TempDir,
    state: Arc<AppState>,
    shutdown: CancellationToken,
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn env() -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.auth.jwt_secret = "0123456789abcdef0123456789abcdef".to_string();
    config.processing.dequeue_timeout_secs = 1;
    config.processing.worker_count = 2;

    let pool = DatabasePool::in_memory().await.unwrap();
    let store = Arc::new(SqliteStore::new(pool.pool().clone()));
    let blobs = Arc::new(wexhub_blob::FsBlobStore::new(dir.path().join("blobs")).unwrap());

    let mut state = build_state_with(
        config,
        store,
        blobs,
        Arc::new(StubGeometryTranslator),
        Arc::new(StubPropertyExtractor),
    )
    .unwrap();

    let shutdown = CancellationToken::new();
    state.spawn_workers(shutdown.clone());

    TestEnv {
        _dir: dir,
        state: Arc::new(state),
        shutdown,
    }
}

/// Registers a user and returns a user-scoped principal (session shape:
/// no workspace binding, all scopes)
async fn session_principal(env: &TestEnv, subject: &str) -> Principal {
    let user = env
        .state
        .authenticator
        .get_or_create_user(subject, subject, None)
        .await
        .unwrap();
    Principal {
        user_id: user.id(),
        subject: user.subject().to_string(),
        workspace: None,
        scopes: ScopeSet::from_scopes(Scope::ALL),
    }
}

async fn workspace_and_project(env: &TestEnv, p: &Principal) -> (Workspace, Project) {
    let workspace = env
        .state
        .workspaces
        .create_workspace(p, "W", None)
        .await
        .unwrap();
    let project = env
        .state
        .projects
        .create_project(p, workspace.id(), "P", None)
        .await
        .unwrap();
    (workspace, project)
}

fn ifc_reader() -> BlobReader {
    Box::new(SAMPLE_IFC)
}

/// Runs the reserve → content → commit sequence for the sample file
async fn upload_sample(
    env: &TestEnv,
    p: &Principal,
    project: &Project,
) -> wexhub_core::domain::file::File {
    let outcome = env
        .state
        .uploads
        .reserve(
            p,
            project.id(),
            ReserveRequest {
                file_name: "SampleHouse.ifc".to_string(),
                content_type: Some("application/x-step".to_string()),
                expected_size_bytes: Some(SAMPLE_IFC.len() as u64),
                prefer_direct_upload: false,
            },
        )
        .await
        .unwrap();

    let mut reader = ifc_reader();
    env.state
        .uploads
        .upload_content(
            p,
            project.id(),
            outcome.session.id(),
            Some(SAMPLE_IFC.len() as u64),
            &mut reader,
        )
        .await
        .unwrap();

    let committed = env
        .state
        .uploads
        .commit(p, project.id(), outcome.session.id())
        .await
        .unwrap();
    committed.file
}

#[tokio::test]
async fn test_happy_path_upload_process_download() {
    let env = env().await;
    let p = session_principal(&env, "alice").await;
    let (_workspace, project) = workspace_and_project(&env, &p).await;

    // Upload and commit the source
    let file = upload_sample(&env, &p, &project).await;
    assert_eq!(file.kind(), FileKind::Source);
    assert_eq!(file.category(), FileCategory::Ifc);
    assert_eq!(file.size_bytes(), SAMPLE_IFC.len() as u64);

    // Uploaded bytes come back verbatim
    let download = env.state.files.download(&p, file.id()).await.unwrap();
    let mut bytes = Vec::new();
    let mut reader = download.reader;
    reader.read_to_end(&mut bytes).await.unwrap();
    assert_eq!(bytes, SAMPLE_IFC);

    // Create the model and its first version
    let model = env
        .state
        .models
        .create_model(&p, project.id(), "House", None)
        .await
        .unwrap();
    let version = env
        .state
        .models
        .create_version(&p, model.id(), file.id())
        .await
        .unwrap();
    assert_eq!(version.status(), VersionStatus::Pending);
    assert_eq!(version.version_number(), 1);

    // Poll until the worker pool finishes both handlers
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    let ready = loop {
        let current = env
            .state
            .models
            .get_version(&p, version.id())
            .await
            .unwrap();
        if current.status().is_terminal() {
            break current;
        }
        assert!(std::time::Instant::now() < deadline, "processing stalled");
        tokio::time::sleep(Duration::from_millis(25)).await;
    };
    assert_eq!(ready.status(), VersionStatus::Ready);
    assert!(ready.wexbim_file_id().is_some());
    assert!(ready.properties_file_id().is_some());
    assert!(ready.processed_at().is_some());
    assert!(ready.error_message().is_none());

    // The wexbim artifact downloads with the stub's magic
    let download = env
        .state
        .models
        .download_wexbim(&p, version.id())
        .await
        .unwrap();
    let mut artifact = Vec::new();
    let mut reader = download.reader;
    reader.read_to_end(&mut artifact).await.unwrap();
    assert!(artifact.starts_with(b"WEXBIM\0"));

    // Extracted properties are queryable through the service
    let page = env
        .state
        .properties
        .query_elements(
            &p,
            version.id(),
            &Default::default(),
            Default::default(),
        )
        .await
        .unwrap();
    assert_eq!(page.total_count, 2);
    let element = env
        .state
        .properties
        .get_element(&p, version.id(), page.items[0].id)
        .await
        .unwrap();
    assert_eq!(element.property_sets.len(), 1);
}

#[tokio::test]
async fn test_commit_is_not_repeatable() {
    let env = env().await;
    let p = session_principal(&env, "alice").await;
    let (_workspace, project) = workspace_and_project(&env, &p).await;

    let outcome = env
        .state
        .uploads
        .reserve(
            &p,
            project.id(),
            ReserveRequest {
                file_name: "model.ifc".to_string(),
                content_type: None,
                expected_size_bytes: None,
                prefer_direct_upload: false,
            },
        )
        .await
        .unwrap();
    let mut reader = ifc_reader();
    env.state
        .uploads
        .upload_content(&p, project.id(), outcome.session.id(), None, &mut reader)
        .await
        .unwrap();
    let first = env
        .state
        .uploads
        .commit(&p, project.id(), outcome.session.id())
        .await
        .unwrap();

    // The retry answers 400 and mutates nothing
    let second = env
        .state
        .uploads
        .commit(&p, project.id(), outcome.session.id())
        .await;
    assert!(matches!(second, Err(DomainError::InvalidState { .. })));

    let file = env.state.files.get_file(&p, first.file.id()).await.unwrap();
    assert!(!file.is_deleted());
}

#[tokio::test]
async fn test_size_mismatch_rejected_at_content_and_commit() {
    let env = env().await;
    let p = session_principal(&env, "alice").await;
    let (_workspace, project) = workspace_and_project(&env, &p).await;

    let outcome = env
        .state
        .uploads
        .reserve(
            &p,
            project.id(),
            ReserveRequest {
                file_name: "model.ifc".to_string(),
                content_type: None,
                expected_size_bytes: Some(SAMPLE_IFC.len() as u64 + 5),
                prefer_direct_upload: false,
            },
        )
        .await
        .unwrap();

    // Declared size disagrees with the reservation
    let mut reader = ifc_reader();
    let declared = env
        .state
        .uploads
        .upload_content(
            &p,
            project.id(),
            outcome.session.id(),
            Some(SAMPLE_IFC.len() as u64),
            &mut reader,
        )
        .await;
    match declared {
        Err(DomainError::Validation(message)) => assert_eq!(message, "Size Mismatch"),
        other => panic!("expected size mismatch, got {other:?}"),
    }

    // Undeclared stream whose actual byte count disagrees is also rejected
    let mut reader = ifc_reader();
    let streamed = env
        .state
        .uploads
        .upload_content(&p, project.id(), outcome.session.id(), None, &mut reader)
        .await;
    assert!(matches!(streamed, Err(DomainError::Validation(_))));

    // Nothing was committed, so the session has no content to commit
    let commit = env
        .state
        .uploads
        .commit(&p, project.id(), outcome.session.id())
        .await;
    assert!(commit.is_err());
}

#[tokio::test]
async fn test_direct_upload_falls_back_to_server_proxy() {
    let env = env().await;
    let p = session_principal(&env, "alice").await;
    let (_workspace, project) = workspace_and_project(&env, &p).await;

    // The filesystem blob store mints no URLs, so the preference is
    // overridden
    let outcome = env
        .state
        .uploads
        .reserve(
            &p,
            project.id(),
            ReserveRequest {
                file_name: "model.ifc".to_string(),
                content_type: None,
                expected_size_bytes: None,
                prefer_direct_upload: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(
        outcome.session.upload_mode(),
        wexhub_core::domain::upload::UploadMode::ServerProxy
    );
    assert!(outcome.session.direct_upload_url().is_none());
}

#[tokio::test]
async fn test_soft_delete_hides_from_usage_and_version_creation() {
    let env = env().await;
    let p = session_principal(&env, "alice").await;
    let (workspace, project) = workspace_and_project(&env, &p).await;
    let file = upload_sample(&env, &p, &project).await;

    let before = env.state.files.workspace_usage(&p, workspace.id()).await.unwrap();
    assert_eq!(before.total_bytes, SAMPLE_IFC.len() as u64);
    assert_eq!(before.file_count, 1);

    env.state.files.soft_delete(&p, file.id()).await.unwrap();

    let after = env.state.files.workspace_usage(&p, workspace.id()).await.unwrap();
    assert_eq!(after.total_bytes, 0);
    assert_eq!(after.file_count, 0);

    // Metadata stays reachable; the content does not
    let metadata = env.state.files.get_file(&p, file.id()).await.unwrap();
    assert!(metadata.is_deleted());
    assert!(env.state.files.download(&p, file.id()).await.is_err());

    // A deleted source cannot back a new version
    let model = env
        .state
        .models
        .create_model(&p, project.id(), "M", None)
        .await
        .unwrap();
    let attempt = env.state.models.create_version(&p, model.id(), file.id()).await;
    assert!(matches!(attempt, Err(DomainError::Validation(_))));

    // Deleting again is a state error
    let again = env.state.files.soft_delete(&p, file.id()).await;
    assert!(matches!(again, Err(DomainError::InvalidState { .. })));
}

#[tokio::test]
async fn test_authorization_leak_guard_returns_not_found() {
    let env = env().await;
    let alice = session_principal(&env, "alice").await;
    let (_workspace, project) = workspace_and_project(&env, &alice).await;
    let file = upload_sample(&env, &alice, &project).await;

    // A user with no membership anywhere sees 404, not 403
    let mallory = session_principal(&env, "mallory").await;
    let by_id = env.state.files.get_file(&mallory, file.id()).await;
    assert!(matches!(by_id, Err(DomainError::NotFound(_))));

    let listing = env
        .state
        .files
        .list_files(
            &mallory,
            project.id(),
            Default::default(),
            Default::default(),
        )
        .await;
    assert!(matches!(listing, Err(DomainError::NotFound(_))));

    let download = env.state.files.download(&mallory, file.id()).await;
    assert!(matches!(download, Err(DomainError::NotFound(_))));
}

#[tokio::test]
async fn test_workspace_bound_principal_cannot_cross_tenants() {
    let env = env().await;
    let alice = session_principal(&env, "alice").await;
    let (workspace_a, project_a) = workspace_and_project(&env, &alice).await;
    let workspace_b = env
        .state
        .workspaces
        .create_workspace(&alice, "Other", None)
        .await
        .unwrap();

    // Same user, but the credential is bound to workspace B
    let bound = Principal {
        workspace: Some(workspace_b.id()),
        ..alice.clone()
    };
    let attempt = env
        .state
        .projects
        .get_project(&bound, project_a.id())
        .await;
    assert!(matches!(attempt, Err(DomainError::NotFound(_))));

    // Bound to A, the same call succeeds
    let bound_a = Principal {
        workspace: Some(workspace_a.id()),
        ..alice
    };
    assert!(env
        .state
        .projects
        .get_project(&bound_a, project_a.id())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_wexbim_download_is_404_until_ready() {
    let env = env().await;
    let p = session_principal(&env, "alice").await;
    let (_workspace, project) = workspace_and_project(&env, &p).await;
    let file = upload_sample(&env, &p, &project).await;
    let model = env
        .state
        .models
        .create_model(&p, project.id(), "M", None)
        .await
        .unwrap();
    let version = env
        .state
        .models
        .create_version(&p, model.id(), file.id())
        .await
        .unwrap();

    // No wexbim link yet: uniform 404 (the worker may not have run)
    let early = env.state.models.download_wexbim(&p, version.id()).await;
    if let Err(err) = early {
        assert!(matches!(err, DomainError::NotFound(_)));
    }
}
