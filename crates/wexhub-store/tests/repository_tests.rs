//! Integration tests for the SQLite store against an in-memory database

use std::sync::Arc;

use chrono::Utc;

use wexhub_core::domain::audit::{AuditEntry, AuditSubject, OAuthAppEvent, PatEvent};
use wexhub_core::domain::file::{File, FileCategory, FileKind};
use wexhub_core::domain::identity::{
    User, Workspace, WorkspaceMembership, WorkspaceRole,
};
use wexhub_core::domain::model::{Model, VersionStatus};
use wexhub_core::domain::newtypes::StorageKey;
use wexhub_core::domain::oauth::{sha256_hex, ClientType, OAuthApp, RefreshTokenRecord};
use wexhub_core::domain::pat::PersonalAccessToken;
use wexhub_core::domain::scope::{Scope, ScopeSet};
use wexhub_core::ports::{
    AuditRepository, CatalogRepository, FileListFilter, IdentityRepository, OAuthRepository,
    PageRequest, PatRepository,
};
use wexhub_store::{DatabasePool, SqliteStore};

async fn store() -> SqliteStore {
    let pool = DatabasePool::in_memory().await.unwrap();
    SqliteStore::new(pool.pool().clone())
}

/// Seeds a user, workspace (with owner membership), and project
async fn seed(store: &SqliteStore) -> (User, Workspace, wexhub_core::domain::identity::Project) {
    let user = User::new("sub-1", "Alice");
    store.create_user(&user).await.unwrap();
    let workspace = Workspace::new("W", None).unwrap();
    let owner = WorkspaceMembership::new(workspace.id(), user.id(), WorkspaceRole::Owner);
    store.create_workspace(&workspace, &owner).await.unwrap();
    let project =
        wexhub_core::domain::identity::Project::new(workspace.id(), "P", None).unwrap();
    store.create_project(&project).await.unwrap();
    (user, workspace, project)
}

fn sample_file(project: wexhub_core::domain::newtypes::ProjectId, name: &str, size: u64) -> File {
    File::new(
        project,
        name,
        "application/x-step",
        size,
        None,
        FileKind::Source,
        FileCategory::from_file_name(name),
        "fs",
        StorageKey::new(format!("ws/proj/uploads/{name}")).unwrap(),
    )
}

#[tokio::test]
async fn test_user_roundtrip_and_subject_uniqueness() {
    let store = store().await;
    let mut user = User::new("sub-1", "Alice");
    store.create_user(&user).await.unwrap();

    let loaded = store.get_user(user.id()).await.unwrap().unwrap();
    assert_eq!(loaded, user);
    assert_eq!(
        store.get_user_by_subject("sub-1").await.unwrap().unwrap().id(),
        user.id()
    );

    user.record_login();
    store.update_user(&user).await.unwrap();
    let reloaded = store.get_user(user.id()).await.unwrap().unwrap();
    assert!(reloaded.last_login_at().is_some());

    // The subject column is unique
    let dup = User::new("sub-1", "Impostor");
    assert!(store.create_user(&dup).await.is_err());
}

#[tokio::test]
async fn test_workspace_creation_is_atomic_with_owner() {
    let store = store().await;
    let (user, workspace, _) = seed(&store).await;

    let membership = store
        .get_workspace_membership(workspace.id(), user.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(membership.role(), WorkspaceRole::Owner);
    assert_eq!(store.count_owners(workspace.id()).await.unwrap(), 1);
    assert_eq!(
        store.list_workspaces_for_user(user.id()).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_file_listing_filters_and_paging() {
    let store = store().await;
    let (_, _, project) = seed(&store).await;

    for i in 0..25 {
        let file = sample_file(project.id(), &format!("model-{i}.ifc"), 100);
        store.create_file(&file).await.unwrap();
    }
    let artifact = File::new(
        project.id(),
        "geo.wexbim",
        "application/octet-stream",
        50,
        None,
        FileKind::Artifact,
        FileCategory::WexBim,
        "fs",
        StorageKey::new("ws/proj/artifacts/geo.wexbim").unwrap(),
    );
    store.create_file(&artifact).await.unwrap();

    // Unfiltered, default page size
    let page = store
        .list_files(project.id(), FileListFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.items.len(), 20);
    assert_eq!(page.total_count, 26);
    assert_eq!(page.page_size, 20);

    // Oversized page request is clamped to 100
    let page = store
        .list_files(
            project.id(),
            FileListFilter::default(),
            PageRequest::new(Some(1), Some(200)),
        )
        .await
        .unwrap();
    assert_eq!(page.page_size, 100);
    assert_eq!(page.items.len(), 26);

    // Category filter
    let page = store
        .list_files(
            project.id(),
            FileListFilter {
                category: Some(FileCategory::WexBim),
                kind: None,
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.items[0].name(), "geo.wexbim");
}

#[tokio::test]
async fn test_soft_delete_excluded_from_listing_and_usage() {
    let store = store().await;
    let (_, workspace, project) = seed(&store).await;

    let mut kept = sample_file(project.id(), "kept.ifc", 1000);
    let mut gone = sample_file(project.id(), "gone.ifc", 500);
    store.create_file(&kept).await.unwrap();
    store.create_file(&gone).await.unwrap();

    gone.soft_delete().unwrap();
    store.update_file(&gone).await.unwrap();

    let page = store
        .list_files(project.id(), FileListFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total_count, 1);

    let usage = store.usage_for_project(project.id()).await.unwrap();
    assert_eq!(usage.total_bytes, 1000);
    assert_eq!(usage.file_count, 1);

    let usage = store.usage_for_workspace(workspace.id()).await.unwrap();
    assert_eq!(usage.total_bytes, 1000);

    // Still reachable by id, with its deletion stamp
    let reloaded = store.get_file(gone.id()).await.unwrap().unwrap();
    assert!(reloaded.is_deleted());
    assert!(reloaded.deleted_at().is_some());

    // kept is untouched
    kept.soft_delete().unwrap();
    store.update_file(&kept).await.unwrap();
    let usage = store.usage_for_project(project.id()).await.unwrap();
    assert_eq!(usage.file_count, 0);
}

#[tokio::test]
async fn test_version_numbers_increase_from_one() {
    let store = store().await;
    let (_, _, project) = seed(&store).await;
    let source = sample_file(project.id(), "m.ifc", 10);
    store.create_file(&source).await.unwrap();
    let model = Model::new(project.id(), "M", None).unwrap();
    store.create_model(&model).await.unwrap();

    let v1 = store.create_version(model.id(), source.id()).await.unwrap();
    let v2 = store.create_version(model.id(), source.id()).await.unwrap();
    let v3 = store.create_version(model.id(), source.id()).await.unwrap();
    assert_eq!(v1.version_number(), 1);
    assert_eq!(v2.version_number(), 2);
    assert_eq!(v3.version_number(), 3);
    assert_eq!(v1.status(), VersionStatus::Pending);

    let page = store
        .list_versions(model.id(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total_count, 3);
    // Highest number first
    assert_eq!(page.items[0].version_number(), 3);
}

#[tokio::test]
async fn test_version_terminal_states_are_write_once() {
    let store = store().await;
    let (_, _, project) = seed(&store).await;
    let source = sample_file(project.id(), "m.ifc", 10);
    store.create_file(&source).await.unwrap();
    let model = Model::new(project.id(), "M", None).unwrap();
    store.create_model(&model).await.unwrap();

    let mut version = store.create_version(model.id(), source.id()).await.unwrap();
    version.start_processing().unwrap();
    store.update_version(&version).await.unwrap();
    version.fail("translator crashed").unwrap();
    store.update_version(&version).await.unwrap();

    let loaded = store.get_version(version.id()).await.unwrap().unwrap();
    assert_eq!(loaded.status(), VersionStatus::Failed);
    assert_eq!(loaded.error_message(), Some("translator crashed"));

    // A stale in-memory copy cannot resurrect a terminal row
    let mut stale = store.create_version(model.id(), source.id()).await.unwrap();
    stale.start_processing().unwrap();
    store.update_version(&stale).await.unwrap();
    stale.complete(source.id(), source.id()).unwrap();
    store.update_version(&stale).await.unwrap();
    assert!(store.update_version(&stale).await.is_err());
}

async fn seed_app(store: &SqliteStore, user: &User, workspace: &Workspace) -> OAuthApp {
    let app = OAuthApp::new(
        workspace.id(),
        "Viewer",
        None,
        ClientType::Public,
        "client-abc".to_string(),
        None,
        vec!["https://example.com/cb".to_string()],
        ScopeSet::from_scopes([Scope::FilesRead, Scope::ModelsRead]),
        user.id(),
    )
    .unwrap();
    let audit = AuditEntry::new(AuditSubject::OAuthApp {
        app_id: app.id(),
        event: OAuthAppEvent::Created,
    })
    .with_actor(user.id());
    store.create_app(&app, &audit).await.unwrap();
    app
}

#[tokio::test]
async fn test_app_lifecycle_writes_audit_in_same_transaction() {
    let store = store().await;
    let (user, workspace, _) = seed(&store).await;
    let app = seed_app(&store, &user, &workspace).await;

    let log = store.list_for_app(app.id(), 10).await.unwrap();
    assert_eq!(log.len(), 1);
    assert!(matches!(
        log[0].subject(),
        AuditSubject::OAuthApp {
            event: OAuthAppEvent::Created,
            ..
        }
    ));

    assert_eq!(
        store
            .get_app_by_client_id("client-abc")
            .await
            .unwrap()
            .unwrap()
            .id(),
        app.id()
    );
}

#[tokio::test]
async fn test_code_consumption_selects_one_winner() {
    let store = store().await;
    let (user, workspace, _) = seed(&store).await;
    let app = seed_app(&store, &user, &workspace).await;

    let code = wexhub_core::domain::oauth::AuthorizationCode::new(
        "the-code".to_string(),
        app.id(),
        user.id(),
        workspace.id(),
        "https://example.com/cb".to_string(),
        ScopeSet::from_scopes([Scope::FilesRead]),
        None,
        None,
    );
    store.insert_code(&code).await.unwrap();

    assert!(store.consume_code("the-code", Utc::now()).await.unwrap());
    // Every later attempt loses
    assert!(!store.consume_code("the-code", Utc::now()).await.unwrap());
    assert!(!store.consume_code("the-code", Utc::now()).await.unwrap());

    let loaded = store.get_code("the-code").await.unwrap().unwrap();
    assert!(loaded.is_used());

    // Unknown codes never win
    assert!(!store.consume_code("no-such-code", Utc::now()).await.unwrap());
}

#[tokio::test]
async fn test_refresh_rotation_and_family_revocation() {
    let store = store().await;
    let (user, workspace, _) = seed(&store).await;
    let app = seed_app(&store, &user, &workspace).await;

    let first = RefreshTokenRecord::new_family(
        sha256_hex("secret-0"),
        app.id(),
        user.id(),
        workspace.id(),
        ScopeSet::from_scopes([Scope::FilesRead]),
        30,
    );
    store.insert_refresh_token(&first, None).await.unwrap();

    // Rotation: revoke the old, insert the successor
    assert!(store
        .revoke_refresh_token(first.token_hash(), Utc::now())
        .await
        .unwrap());
    let second = first.rotate(sha256_hex("secret-1"), 30);
    store.insert_refresh_token(&second, None).await.unwrap();

    // Revoking an already-revoked token loses the race
    assert!(!store
        .revoke_refresh_token(first.token_hash(), Utc::now())
        .await
        .unwrap());

    // Family kill sweeps the active remainder
    let revoked = store
        .revoke_family(first.family_id(), Utc::now())
        .await
        .unwrap();
    assert_eq!(revoked, 1);
    let reloaded = store
        .get_refresh_token(second.token_hash())
        .await
        .unwrap()
        .unwrap();
    assert!(reloaded.is_revoked());
}

#[tokio::test]
async fn test_pat_prefix_lookup_and_audit() {
    let store = store().await;
    let (user, workspace, _) = seed(&store).await;

    let pat = PersonalAccessToken::new(
        workspace.id(),
        user.id(),
        "ci-token",
        None,
        "PFXPFXPFXPF".to_string(),
        "stored-hash".to_string(),
        ScopeSet::from_scopes([Scope::FilesRead]),
        Some(30),
    )
    .unwrap();
    let audit = AuditEntry::new(AuditSubject::Pat {
        pat_id: pat.id(),
        event: PatEvent::Created,
    })
    .with_actor(user.id());
    store.create_pat(&pat, &audit).await.unwrap();

    let loaded = store
        .get_pat_by_prefix("PFXPFXPFXPF")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.id(), pat.id());
    assert!(store.get_pat_by_prefix("unknown").await.unwrap().is_none());

    store.touch_last_used(pat.id(), Utc::now()).await.unwrap();
    let touched = store.get_pat(pat.id()).await.unwrap().unwrap();
    assert!(touched.last_used_at().is_some());

    let log = store.list_for_pat(pat.id(), 10).await.unwrap();
    assert_eq!(log.len(), 1);

    assert_eq!(
        store.list_pats(workspace.id(), user.id()).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_app_delete_cascades_tokens_and_audit() {
    let store = store().await;
    let (user, workspace, _) = seed(&store).await;
    let app = seed_app(&store, &user, &workspace).await;

    let token = RefreshTokenRecord::new_family(
        sha256_hex("s"),
        app.id(),
        user.id(),
        workspace.id(),
        ScopeSet::from_scopes([Scope::FilesRead]),
        30,
    );
    store.insert_refresh_token(&token, None).await.unwrap();

    store.delete_app(app.id()).await.unwrap();

    assert!(store.get_app(app.id()).await.unwrap().is_none());
    assert!(store
        .get_refresh_token(token.token_hash())
        .await
        .unwrap()
        .is_none());
    assert!(store.list_for_app(app.id(), 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_serves_concurrent_readers() {
    let store = Arc::new(store().await);
    let (_, _, project) = seed(&store).await;
    for i in 0..5 {
        store
            .create_file(&sample_file(project.id(), &format!("f{i}.ifc"), 10))
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        let project_id = project.id();
        handles.push(tokio::spawn(async move {
            let page = store
                .list_files(project_id, FileListFilter::default(), PageRequest::default())
                .await
                .unwrap();
            page.total_count
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 5);
    }
}
