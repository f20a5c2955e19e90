//! OAuth and PAT flows against the SQLite store
//!
//! Exercises the authorization-code round trip with PKCE, code
//! replay, refresh-token rotation with family-wide reuse revocation,
//! the open-redirect guard, client secret verification, and the PAT
//! lifecycle end to end.

use std::sync::Arc;

use wexhub_audit::AuditRecorder;
use wexhub_auth::oauth::AuthorizeRejection;
use wexhub_auth::{
    AuthorizeRequest, BearerAuthenticator, OAuthService, PatService, TokenIssuer, TokenRequest,
};
use wexhub_core::domain::audit::{AuditSubject, OAuthAppEvent, PatEvent};
use wexhub_core::domain::errors::{DomainError, OAuthErrorCode};
use wexhub_core::domain::identity::{User, Workspace, WorkspaceMembership, WorkspaceRole};
use wexhub_core::domain::oauth::{s256_challenge, ClientType, OAuthApp};
use wexhub_core::domain::scope::{Scope, ScopeSet};
use wexhub_core::ports::{IdentityRepository, OAuthRepository};
use wexhub_core::usecases::AccessGate;
use wexhub_store::{DatabasePool, SqliteStore};

const REDIRECT: &str = "https://example.com/cb";

struct Fixture {
    store: Arc<SqliteStore>,
    oauth: OAuthService,
    pats: Arc<PatService>,
    issuer: Arc<TokenIssuer>,
    user: User,
    workspace: Workspace,
}

async fn fixture(client_type: ClientType, secret_hash: Option<String>) -> Fixture {
    let pool = DatabasePool::in_memory().await.unwrap();
    let store = Arc::new(SqliteStore::new(pool.pool().clone()));
    let issuer = Arc::new(TokenIssuer::new(
        b"0123456789abcdef0123456789abcdef",
        "wexhub",
        3600,
    ));

    let user = User::new("sub-alice", "Alice");
    store.create_user(&user).await.unwrap();
    let workspace = Workspace::new("W", None).unwrap();
    store
        .create_workspace(
            &workspace,
            &WorkspaceMembership::new(workspace.id(), user.id(), WorkspaceRole::Owner),
        )
        .await
        .unwrap();

    let app = OAuthApp::new(
        workspace.id(),
        "Viewer",
        None,
        client_type,
        "client-abc".to_string(),
        secret_hash,
        vec![REDIRECT.to_string()],
        ScopeSet::from_scopes([Scope::FilesRead, Scope::FilesWrite]),
        user.id(),
    )
    .unwrap();
    let created = wexhub_core::domain::audit::AuditEntry::new(AuditSubject::OAuthApp {
        app_id: app.id(),
        event: OAuthAppEvent::Created,
    });
    store.create_app(&app, &created).await.unwrap();

    let gate = Arc::new(AccessGate::new(store.clone()));
    let recorder = Arc::new(AuditRecorder::new(store.clone()));
    let oauth = OAuthService::new(store.clone(), store.clone(), issuer.clone(), 30);
    let pats = Arc::new(PatService::new(
        store.clone(),
        recorder,
        store.clone(),
        gate,
    ));

    Fixture {
        store,
        oauth,
        pats,
        issuer,
        user,
        workspace,
    }
}

fn authorize_request(challenge: Option<String>) -> AuthorizeRequest {
    AuthorizeRequest {
        response_type: Some("code".to_string()),
        client_id: Some("client-abc".to_string()),
        redirect_uri: Some(REDIRECT.to_string()),
        scope: Some("files:read files:write".to_string()),
        state: Some("xyz".to_string()),
        code_challenge: challenge,
        code_challenge_method: Some("S256".to_string()),
    }
}

/// Extracts a query parameter from a redirect location
fn query_param(location: &str, name: &str) -> Option<String> {
    let url = url::Url::parse(location).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.to_string())
}

#[tokio::test]
async fn test_pkce_round_trip_issues_tokens() {
    let fixture = fixture(ClientType::Public, None).await;
    let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

    let location = fixture
        .oauth
        .authorize(
            fixture.user.id(),
            authorize_request(Some(s256_challenge(verifier))),
        )
        .await
        .unwrap();
    assert!(location.starts_with(REDIRECT));
    assert_eq!(query_param(&location, "state").as_deref(), Some("xyz"));
    let code = query_param(&location, "code").unwrap();
    assert!(code.len() >= 22, "code must carry at least 128 bits");

    let grant = fixture
        .oauth
        .token(
            TokenRequest {
                grant_type: Some("authorization_code".to_string()),
                client_id: Some("client-abc".to_string()),
                code: Some(code.clone()),
                redirect_uri: Some(REDIRECT.to_string()),
                code_verifier: Some(verifier.to_string()),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(grant.token_type, "Bearer");
    assert_eq!(grant.scope, "files:read files:write");
    assert!(grant.refresh_token.as_ref().unwrap().starts_with("octr_"));

    let claims = fixture.issuer.verify(&grant.access_token).unwrap();
    assert_eq!(claims.sub, "sub-alice");
    assert_eq!(
        claims.workspace().unwrap(),
        Some(fixture.workspace.id())
    );

    // The code is one-shot: replay fails even with correct PKCE
    let replay = fixture
        .oauth
        .token(
            TokenRequest {
                grant_type: Some("authorization_code".to_string()),
                client_id: Some("client-abc".to_string()),
                code: Some(code),
                redirect_uri: Some(REDIRECT.to_string()),
                code_verifier: Some(verifier.to_string()),
                ..Default::default()
            },
            None,
        )
        .await;
    assert!(matches!(
        replay,
        Err(DomainError::Authentication {
            code: OAuthErrorCode::InvalidGrant,
            ..
        })
    ));
}

#[tokio::test]
async fn test_wrong_verifier_burns_the_code() {
    let fixture = fixture(ClientType::Public, None).await;
    let location = fixture
        .oauth
        .authorize(
            fixture.user.id(),
            authorize_request(Some(s256_challenge("right-verifier"))),
        )
        .await
        .unwrap();
    let code = query_param(&location, "code").unwrap();

    let request = |verifier: &str| TokenRequest {
        grant_type: Some("authorization_code".to_string()),
        client_id: Some("client-abc".to_string()),
        code: Some(code.clone()),
        redirect_uri: Some(REDIRECT.to_string()),
        code_verifier: Some(verifier.to_string()),
        ..Default::default()
    };

    // Wrong verifier: invalid_grant, and the code is consumed anyway
    let wrong = fixture.oauth.token(request("wrong-verifier"), None).await;
    assert!(matches!(
        wrong,
        Err(DomainError::Authentication {
            code: OAuthErrorCode::InvalidGrant,
            ..
        })
    ));
    let right = fixture.oauth.token(request("right-verifier"), None).await;
    assert!(right.is_err(), "a burned code must stay burned");
}

#[tokio::test]
async fn test_unregistered_redirect_is_a_direct_400() {
    let fixture = fixture(ClientType::Public, None).await;
    let mut request = authorize_request(Some(s256_challenge("v")));
    request.redirect_uri = Some("https://attacker.com/cb".to_string());

    let rejection = fixture
        .oauth
        .authorize(fixture.user.id(), request)
        .await
        .unwrap_err();
    match rejection {
        AuthorizeRejection::BadRequest { code, description } => {
            assert_eq!(code, OAuthErrorCode::InvalidRequest);
            assert!(description.contains("redirect_uri"));
        }
        AuthorizeRejection::Redirect { location } => {
            panic!("must not redirect to an unregistered URI: {location}")
        }
    }
}

#[tokio::test]
async fn test_public_client_requires_pkce_and_valid_scope() {
    let fixture = fixture(ClientType::Public, None).await;

    // Missing challenge redirects back with invalid_request
    let rejection = fixture
        .oauth
        .authorize(fixture.user.id(), authorize_request(None))
        .await
        .unwrap_err();
    match rejection {
        AuthorizeRejection::Redirect { location } => {
            assert_eq!(
                query_param(&location, "error").as_deref(),
                Some("invalid_request")
            );
            assert_eq!(query_param(&location, "state").as_deref(), Some("xyz"));
        }
        other => panic!("expected error redirect, got {other:?}"),
    }

    // A scope outside the app's allow-list redirects with invalid_scope
    let mut request = authorize_request(Some(s256_challenge("v")));
    request.scope = Some("files:read models:write".to_string());
    let rejection = fixture
        .oauth
        .authorize(fixture.user.id(), request)
        .await
        .unwrap_err();
    match rejection {
        AuthorizeRejection::Redirect { location } => {
            assert_eq!(
                query_param(&location, "error").as_deref(),
                Some("invalid_scope")
            );
        }
        other => panic!("expected error redirect, got {other:?}"),
    }

    // An unknown response_type redirects with unsupported_response_type
    let mut request = authorize_request(Some(s256_challenge("v")));
    request.response_type = Some("token".to_string());
    let rejection = fixture
        .oauth
        .authorize(fixture.user.id(), request)
        .await
        .unwrap_err();
    match rejection {
        AuthorizeRejection::Redirect { location } => {
            assert_eq!(
                query_param(&location, "error").as_deref(),
                Some("unsupported_response_type")
            );
        }
        other => panic!("expected error redirect, got {other:?}"),
    }
}

#[tokio::test]
async fn test_refresh_rotation_and_reuse_kills_family() {
    let fixture = fixture(ClientType::Public, None).await;
    let verifier = "a-reasonably-long-pkce-verifier-string";
    let location = fixture
        .oauth
        .authorize(
            fixture.user.id(),
            authorize_request(Some(s256_challenge(verifier))),
        )
        .await
        .unwrap();
    let code = query_param(&location, "code").unwrap();

    let grant = fixture
        .oauth
        .token(
            TokenRequest {
                grant_type: Some("authorization_code".to_string()),
                client_id: Some("client-abc".to_string()),
                code: Some(code),
                redirect_uri: Some(REDIRECT.to_string()),
                code_verifier: Some(verifier.to_string()),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    let r0 = grant.refresh_token.unwrap();

    let refresh = |token: String| TokenRequest {
        grant_type: Some("refresh_token".to_string()),
        client_id: Some("client-abc".to_string()),
        refresh_token: Some(token),
        ..Default::default()
    };

    // Rotate: R0 -> R1
    let rotated = fixture.oauth.token(refresh(r0.clone()), None).await.unwrap();
    let r1 = rotated.refresh_token.unwrap();
    assert_ne!(r0, r1);
    assert_eq!(rotated.scope, "files:read files:write");

    // Reuse of R0 is detected and the whole family dies
    let reuse = fixture.oauth.token(refresh(r0), None).await;
    assert!(matches!(
        reuse,
        Err(DomainError::Authentication {
            code: OAuthErrorCode::InvalidGrant,
            ..
        })
    ));

    // R1 was revoked by the family kill
    let after_kill = fixture.oauth.token(refresh(r1), None).await;
    assert!(matches!(
        after_kill,
        Err(DomainError::Authentication {
            code: OAuthErrorCode::InvalidGrant,
            ..
        })
    ));
}

#[tokio::test]
async fn test_revoke_always_succeeds_and_disables_the_token() {
    let fixture = fixture(ClientType::Public, None).await;
    let verifier = "verifier-for-the-revocation-test";
    let location = fixture
        .oauth
        .authorize(
            fixture.user.id(),
            authorize_request(Some(s256_challenge(verifier))),
        )
        .await
        .unwrap();
    let code = query_param(&location, "code").unwrap();
    let grant = fixture
        .oauth
        .token(
            TokenRequest {
                grant_type: Some("authorization_code".to_string()),
                client_id: Some("client-abc".to_string()),
                code: Some(code),
                redirect_uri: Some(REDIRECT.to_string()),
                code_verifier: Some(verifier.to_string()),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    let refresh_token = grant.refresh_token.unwrap();

    // Unknown and malformed tokens do not error
    fixture.oauth.revoke("garbage").await;
    fixture.oauth.revoke(&refresh_token).await;

    let attempt = fixture
        .oauth
        .token(
            TokenRequest {
                grant_type: Some("refresh_token".to_string()),
                client_id: Some("client-abc".to_string()),
                refresh_token: Some(refresh_token),
                ..Default::default()
            },
            None,
        )
        .await;
    assert!(attempt.is_err());
}

#[tokio::test]
async fn test_confidential_client_secret_verification() {
    let secret = "wexcs_super-secret-value";
    let fixture = fixture(
        ClientType::Confidential,
        Some(wexhub_auth::secrets::hash_secret(secret)),
    )
    .await;

    let base = TokenRequest {
        grant_type: Some("refresh_token".to_string()),
        client_id: Some("client-abc".to_string()),
        refresh_token: Some("octr_whatever".to_string()),
        ..Default::default()
    };

    // Wrong secret: invalid_client before any grant logic
    let wrong = fixture
        .oauth
        .token(
            TokenRequest {
                client_secret: Some("wrong".to_string()),
                ..base.clone()
            },
            None,
        )
        .await;
    assert!(matches!(
        wrong,
        Err(DomainError::Authentication {
            code: OAuthErrorCode::InvalidClient,
            ..
        })
    ));

    // Missing secret is also invalid_client
    let missing = fixture.oauth.token(base.clone(), None).await;
    assert!(matches!(
        missing,
        Err(DomainError::Authentication {
            code: OAuthErrorCode::InvalidClient,
            ..
        })
    ));

    // Right secret authenticates the client; the grant then fails on the
    // unknown refresh token
    let right = fixture
        .oauth
        .token(
            TokenRequest {
                client_secret: Some(secret.to_string()),
                ..base
            },
            None,
        )
        .await;
    assert!(matches!(
        right,
        Err(DomainError::Authentication {
            code: OAuthErrorCode::InvalidGrant,
            ..
        })
    ));
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let fixture = fixture(ClientType::Public, None).await;
    let attempt = fixture
        .oauth
        .token(
            TokenRequest {
                grant_type: Some("password".to_string()),
                client_id: Some("client-abc".to_string()),
                ..Default::default()
            },
            None,
        )
        .await;
    assert!(matches!(
        attempt,
        Err(DomainError::Authentication {
            code: OAuthErrorCode::UnsupportedGrantType,
            ..
        })
    ));
}

#[tokio::test]
async fn test_pat_lifecycle_and_authentication() {
    let fixture = fixture(ClientType::Public, None).await;
    let principal = wexhub_core::domain::scope::Principal {
        user_id: fixture.user.id(),
        subject: fixture.user.subject().to_string(),
        workspace: None,
        scopes: ScopeSet::parse("pats:read pats:write files:read").unwrap(),
    };

    let created = fixture
        .pats
        .create(
            &principal,
            Some("203.0.113.7"),
            fixture.workspace.id(),
            "ci-token",
            None,
            ScopeSet::from_scopes([Scope::FilesRead]),
            Some(30),
        )
        .await
        .unwrap();
    assert!(created.wire_token.starts_with("ocpat_"));

    // The wire token authenticates into a workspace-bound principal
    let authenticated = fixture
        .pats
        .authenticate(&created.wire_token, Some("203.0.113.7"))
        .await
        .unwrap();
    assert_eq!(authenticated.user_id, fixture.user.id());
    assert_eq!(authenticated.workspace, Some(fixture.workspace.id()));
    assert!(authenticated.scopes.contains(Scope::FilesRead));
    assert!(!authenticated.scopes.contains(Scope::FilesWrite));

    // Creation and use both left audit entries
    let log = fixture
        .pats
        .audit_log(&principal, created.pat.id(), 10)
        .await
        .unwrap();
    let events: Vec<_> = log
        .iter()
        .map(|entry| match entry.subject() {
            AuditSubject::Pat { event, .. } => *event,
            other => panic!("unexpected subject {other:?}"),
        })
        .collect();
    assert!(events.contains(&PatEvent::Created));
    assert!(events.contains(&PatEvent::Used));

    // Revoked tokens stop authenticating and reject updates
    fixture
        .pats
        .revoke(&principal, None, created.pat.id())
        .await
        .unwrap();
    assert!(fixture
        .pats
        .authenticate(&created.wire_token, None)
        .await
        .is_err());
    assert!(fixture
        .pats
        .update(&principal, None, created.pat.id(), "renamed", None)
        .await
        .is_err());
}

#[tokio::test]
async fn test_pat_cannot_exceed_creator_scopes() {
    let fixture = fixture(ClientType::Public, None).await;
    let principal = wexhub_core::domain::scope::Principal {
        user_id: fixture.user.id(),
        subject: fixture.user.subject().to_string(),
        workspace: None,
        scopes: ScopeSet::parse("pats:write files:read").unwrap(),
    };

    let attempt = fixture
        .pats
        .create(
            &principal,
            None,
            fixture.workspace.id(),
            "escalator",
            None,
            ScopeSet::from_scopes([Scope::FilesWrite]),
            None,
        )
        .await;
    assert!(matches!(attempt, Err(DomainError::Validation(_))));
}

#[tokio::test]
async fn test_bearer_authenticator_routes_both_credential_shapes() {
    let fixture = fixture(ClientType::Public, None).await;
    let authenticator = BearerAuthenticator::new(
        fixture.issuer.clone(),
        fixture.pats.clone(),
        fixture.store.clone(),
    );

    // JWT path
    let token = fixture
        .issuer
        .issue(
            fixture.user.subject(),
            Some(fixture.workspace.id()),
            &ScopeSet::from_scopes([Scope::FilesRead]),
            "client-abc",
        )
        .unwrap();
    let principal = authenticator.authenticate(&token, None).await.unwrap();
    assert_eq!(principal.user_id, fixture.user.id());
    assert_eq!(principal.workspace, Some(fixture.workspace.id()));

    // PAT path
    let gate_principal = wexhub_core::domain::scope::Principal {
        user_id: fixture.user.id(),
        subject: fixture.user.subject().to_string(),
        workspace: None,
        scopes: ScopeSet::parse("pats:write files:read").unwrap(),
    };
    let created = fixture
        .pats
        .create(
            &gate_principal,
            None,
            fixture.workspace.id(),
            "t",
            None,
            ScopeSet::from_scopes([Scope::FilesRead]),
            None,
        )
        .await
        .unwrap();
    let principal = authenticator
        .authenticate(&created.wire_token, None)
        .await
        .unwrap();
    assert_eq!(principal.workspace, Some(fixture.workspace.id()));

    // Garbage is rejected
    assert!(authenticator.authenticate("garbage", None).await.is_err());
}
