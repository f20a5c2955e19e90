//! `/api/v1` handlers
//!
//! Every route authenticates the bearer, then hands the principal to the
//! matching use case. Handlers parse wire input, call exactly one
//! service method, and project the result; all policy lives below.

use std::str::FromStr;

use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use wexhub_core::domain::errors::DomainError;
use wexhub_core::domain::file::{FileCategory, FileKind};
use wexhub_core::domain::identity::{ProjectRole, WorkspaceRole};
use wexhub_core::domain::newtypes::{
    AppId, Email, FileId, ModelId, PatId, ProjectId, UniqueId, UploadId, UserId, VersionId,
    WorkspaceId,
};
use wexhub_core::domain::oauth::ClientType;
use wexhub_core::domain::properties::PropertyFilter;
use wexhub_core::domain::scope::{Principal, Scope, ScopeSet};
use wexhub_core::ports::{FileListFilter, PageRequest};
use wexhub_core::usecases::ReserveRequest;

use super::body::{self, multipart_file, read_limited, BodyReader, HttpBody, ReaderBody};
use super::dto;
use super::error::{api_error, json_response};
use super::rate_limit::LimitedEndpoint;
use super::{bearer_principal, respond, AppState};

/// Largest accepted JSON request body
const MAX_JSON_BYTES: usize = 64 * 1024;

/// Default audit-log page length
const AUDIT_LOG_LIMIT: u32 = 50;

type HandlerResult = Result<Response<HttpBody>, DomainError>;

/// Routes a request under `/api/v1`
pub async fn route(
    state: &AppState,
    request: Request<Incoming>,
    method: &Method,
    segments: &[String],
    client_ip: Option<&str>,
) -> Response<HttpBody> {
    let seg: Vec<&str> = segments.iter().map(String::as_str).collect();

    // Session establishment is the one unauthenticated route: it stands
    // in for the external identity layer handing over a verified subject
    if *method == Method::POST && seg.as_slice() == ["session"] {
        return respond(session(state, request).await);
    }

    let principal = match bearer_principal(state, request.headers(), client_ip).await {
        Ok(principal) => principal,
        Err(err) => return api_error(err),
    };
    let p = &principal;

    let query = request.uri().query().map(str::to_string);
    let result = match (method, seg.as_slice()) {
        // --- Workspaces ---
        (&Method::POST, ["workspaces"]) => create_workspace(state, p, request).await,
        (&Method::GET, ["workspaces"]) => list_workspaces(state, p).await,
        (&Method::GET, ["workspaces", id]) => get_workspace(state, p, id).await,
        (&Method::PUT, ["workspaces", id]) => {
            let id = id.to_string();
            update_workspace(state, p, &id, request).await
        }
        (&Method::GET, ["workspaces", id, "usage"]) => workspace_usage(state, p, id).await,

        // --- Workspace members ---
        (&Method::GET, ["workspaces", id, "members"]) => list_members(state, p, id).await,
        (&Method::PUT, ["workspaces", id, "members", user_id]) => {
            let (id, user_id) = (id.to_string(), user_id.to_string());
            change_member_role(state, p, &id, &user_id, request).await
        }
        (&Method::DELETE, ["workspaces", id, "members", user_id]) => {
            remove_member(state, p, id, user_id).await
        }

        // --- Invites ---
        (&Method::POST, ["workspaces", "invites", token, "accept"]) => {
            accept_invite(state, p, token).await
        }
        (&Method::POST, ["workspaces", id, "invites"]) => {
            let id = id.to_string();
            create_invite(state, p, &id, request).await
        }
        (&Method::GET, ["workspaces", id, "invites"]) => list_invites(state, p, id).await,
        (&Method::DELETE, ["workspaces", id, "invites", invite_id]) => {
            revoke_invite(state, p, id, invite_id).await
        }

        // --- OAuth apps ---
        (&Method::POST, ["workspaces", id, "apps"]) => {
            let id = id.to_string();
            create_app(state, p, &id, request, client_ip).await
        }
        (&Method::GET, ["workspaces", id, "apps"]) => list_apps(state, p, id).await,
        (&Method::GET, ["apps", id]) => get_app(state, p, id).await,
        (&Method::PUT, ["apps", id]) => {
            let id = id.to_string();
            update_app(state, p, &id, request, client_ip).await
        }
        (&Method::DELETE, ["apps", id]) => delete_app(state, p, id).await,
        (&Method::POST, ["apps", id, "enable"]) => {
            set_app_enabled(state, p, id, true, client_ip).await
        }
        (&Method::POST, ["apps", id, "disable"]) => {
            set_app_enabled(state, p, id, false, client_ip).await
        }
        (&Method::POST, ["apps", id, "rotate-secret"]) => {
            rotate_app_secret(state, p, id, client_ip).await
        }
        (&Method::GET, ["apps", id, "audit-logs"]) => app_audit_logs(state, p, id).await,

        // --- PATs ---
        (&Method::POST, ["workspaces", id, "pats"]) => {
            let id = id.to_string();
            create_pat(state, p, &id, request, client_ip).await
        }
        (&Method::GET, ["workspaces", id, "pats"]) => list_pats(state, p, id).await,
        (&Method::PUT, ["pats", id]) => {
            let id = id.to_string();
            update_pat(state, p, &id, request, client_ip).await
        }
        (&Method::DELETE, ["pats", id]) => revoke_pat(state, p, id, client_ip).await,
        (&Method::GET, ["pats", id, "audit-logs"]) => pat_audit_logs(state, p, id).await,

        // --- Projects ---
        (&Method::POST, ["workspaces", id, "projects"]) => {
            let id = id.to_string();
            create_project(state, p, &id, request).await
        }
        (&Method::GET, ["workspaces", id, "projects"]) => list_projects(state, p, id).await,
        (&Method::GET, ["projects", id]) => get_project(state, p, id).await,
        (&Method::PUT, ["projects", id]) => {
            let id = id.to_string();
            update_project(state, p, &id, request).await
        }
        (&Method::GET, ["projects", id, "usage"]) => project_usage(state, p, id).await,
        (&Method::GET, ["projects", id, "members"]) => list_project_members(state, p, id).await,
        (&Method::PUT, ["projects", id, "members", user_id]) => {
            let (id, user_id) = (id.to_string(), user_id.to_string());
            set_project_member(state, p, &id, &user_id, request).await
        }
        (&Method::DELETE, ["projects", id, "members", user_id]) => {
            remove_project_member(state, p, id, user_id).await
        }

        // --- Uploads ---
        (&Method::POST, ["projects", id, "files", "uploads"]) => {
            let id = id.to_string();
            reserve_upload(state, p, &id, request).await
        }
        (&Method::POST, ["projects", id, "files", "uploads", session_id, "content"]) => {
            let (id, session_id) = (id.to_string(), session_id.to_string());
            upload_content(state, p, &id, &session_id, request).await
        }
        (&Method::POST, ["projects", id, "files", "uploads", session_id, "commit"]) => {
            commit_upload(state, p, id, session_id).await
        }

        // --- Files ---
        (&Method::GET, ["projects", id, "files"]) => {
            list_files(state, p, id, query.as_deref()).await
        }
        (&Method::GET, ["files", id]) => get_file(state, p, id).await,
        (&Method::GET, ["files", id, "content"]) => download_file(state, p, id).await,
        (&Method::DELETE, ["files", id]) => delete_file(state, p, id).await,

        // --- Models and versions ---
        (&Method::POST, ["projects", id, "models"]) => {
            let id = id.to_string();
            create_model(state, p, &id, request).await
        }
        (&Method::GET, ["projects", id, "models"]) => list_models(state, p, id).await,
        (&Method::GET, ["models", id]) => get_model(state, p, id).await,
        (&Method::POST, ["models", id, "versions"]) => {
            let id = id.to_string();
            create_version(state, p, &id, request).await
        }
        (&Method::GET, ["models", id, "versions"]) => {
            list_versions(state, p, id, query.as_deref()).await
        }
        (&Method::GET, ["modelversions", id]) => get_version(state, p, id).await,
        (&Method::GET, ["modelversions", id, "wexbim"]) => download_wexbim(state, p, id).await,
        (&Method::GET, ["modelversions", id, "properties"]) => {
            query_properties(state, p, id, query.as_deref()).await
        }
        (&Method::GET, ["modelversions", id, "properties", "elements", element_id]) => {
            get_element(state, p, id, element_id).await
        }

        _ => Err(DomainError::NotFound("route".to_string())),
    };
    respond(result)
}

// ============================================================================
// Parsing helpers
// ============================================================================

/// Parses a path id; malformed ids read as absent resources
fn parse_id<T: FromStr>(raw: &str, resource: &str) -> Result<T, DomainError> {
    raw.parse::<T>()
        .map_err(|_| DomainError::NotFound(resource.to_string()))
}

async fn read_json<T: serde::de::DeserializeOwned>(body: Incoming) -> Result<T, DomainError> {
    let bytes = read_limited(body, MAX_JSON_BYTES)
        .await
        .map_err(|_| DomainError::Validation("Request body too large or unreadable".to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| DomainError::Validation(format!("Malformed JSON body: {e}")))
}

fn query_params(query: Option<&str>) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .into_owned()
        .collect()
}

fn query_get<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn page_request(params: &[(String, String)]) -> PageRequest {
    let page = query_get(params, "page").and_then(|v| v.parse().ok());
    let page_size = query_get(params, "pageSize").and_then(|v| v.parse().ok());
    PageRequest::new(page, page_size)
}

fn ok(body: serde_json::Value) -> HandlerResult {
    Ok(json_response(StatusCode::OK, body))
}

fn created(body: serde_json::Value) -> HandlerResult {
    Ok(json_response(StatusCode::CREATED, body))
}

fn no_content() -> HandlerResult {
    let mut response = Response::new(body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    Ok(response)
}

fn parse_workspace_role(raw: &str) -> Result<WorkspaceRole, DomainError> {
    match raw {
        "guest" => Ok(WorkspaceRole::Guest),
        "member" => Ok(WorkspaceRole::Member),
        "admin" => Ok(WorkspaceRole::Admin),
        "owner" => Ok(WorkspaceRole::Owner),
        other => Err(DomainError::Validation(format!("Unknown role: {other}"))),
    }
}

fn parse_project_role(raw: &str) -> Result<ProjectRole, DomainError> {
    match raw {
        "viewer" => Ok(ProjectRole::Viewer),
        "editor" => Ok(ProjectRole::Editor),
        "project_admin" => Ok(ProjectRole::ProjectAdmin),
        other => Err(DomainError::Validation(format!("Unknown role: {other}"))),
    }
}

// ============================================================================
// Session bootstrap
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionBody {
    subject: String,
    display_name: String,
    email: Option<String>,
}

/// Exchanges a verified external subject for a session access token
///
/// The token is user-scoped: no `tid`, full scope set, so the gate later
/// limits access purely by membership.
async fn session(state: &AppState, request: Request<Incoming>) -> HandlerResult {
    let body: SessionBody = read_json(request.into_body()).await?;
    let user = state
        .authenticator
        .get_or_create_user(&body.subject, &body.display_name, body.email.as_deref())
        .await?;
    let scopes = ScopeSet::from_scopes(Scope::ALL);
    let token = state.issuer.issue(user.subject(), None, &scopes, "session")?;
    ok(json!({
        "accessToken": token,
        "tokenType": "Bearer",
        "expiresIn": state.issuer.ttl_secs(),
        "userId": user.id().to_string(),
    }))
}

// ============================================================================
// Workspaces
// ============================================================================

#[derive(Deserialize)]
struct NameBody {
    name: String,
    description: Option<String>,
}

async fn create_workspace(
    state: &AppState,
    p: &Principal,
    request: Request<Incoming>,
) -> HandlerResult {
    let body: NameBody = read_json(request.into_body()).await?;
    let workspace = state
        .workspaces
        .create_workspace(p, &body.name, body.description)
        .await?;
    created(dto::workspace(&workspace))
}

async fn list_workspaces(state: &AppState, p: &Principal) -> HandlerResult {
    let workspaces = state.workspaces.list_workspaces(p).await?;
    ok(json!(workspaces.iter().map(dto::workspace).collect::<Vec<_>>()))
}

async fn get_workspace(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: WorkspaceId = parse_id(id, "workspace")?;
    let workspace = state.workspaces.get_workspace(p, id).await?;
    ok(dto::workspace(&workspace))
}

async fn update_workspace(
    state: &AppState,
    p: &Principal,
    id: &str,
    request: Request<Incoming>,
) -> HandlerResult {
    let id: WorkspaceId = parse_id(id, "workspace")?;
    let body: NameBody = read_json(request.into_body()).await?;
    let workspace = state
        .workspaces
        .update_workspace(p, id, &body.name, body.description)
        .await?;
    ok(dto::workspace(&workspace))
}

async fn workspace_usage(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: WorkspaceId = parse_id(id, "workspace")?;
    let usage = state.files.workspace_usage(p, id).await?;
    ok(dto::usage(&usage))
}

// ============================================================================
// Workspace members and invites
// ============================================================================

async fn list_members(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: WorkspaceId = parse_id(id, "workspace")?;
    let members = state.workspaces.list_members(p, id).await?;
    ok(json!(members
        .iter()
        .map(dto::workspace_membership)
        .collect::<Vec<_>>()))
}

#[derive(Deserialize)]
struct RoleBody {
    role: String,
}

async fn change_member_role(
    state: &AppState,
    p: &Principal,
    id: &str,
    user_id: &str,
    request: Request<Incoming>,
) -> HandlerResult {
    let id: WorkspaceId = parse_id(id, "workspace")?;
    let user_id: UserId = parse_id(user_id, "membership")?;
    let body: RoleBody = read_json(request.into_body()).await?;
    let membership = state
        .workspaces
        .change_member_role(p, id, user_id, parse_workspace_role(&body.role)?)
        .await?;
    ok(dto::workspace_membership(&membership))
}

async fn remove_member(state: &AppState, p: &Principal, id: &str, user_id: &str) -> HandlerResult {
    let id: WorkspaceId = parse_id(id, "workspace")?;
    let user_id: UserId = parse_id(user_id, "membership")?;
    state.workspaces.remove_member(p, id, user_id).await?;
    no_content()
}

#[derive(Deserialize)]
struct InviteBody {
    email: String,
    role: String,
}

async fn create_invite(
    state: &AppState,
    p: &Principal,
    id: &str,
    request: Request<Incoming>,
) -> HandlerResult {
    let id: WorkspaceId = parse_id(id, "workspace")?;
    let body: InviteBody = read_json(request.into_body()).await?;
    let invite = state
        .workspaces
        .create_invite(p, id, Email::new(body.email)?, parse_workspace_role(&body.role)?)
        .await?;
    created(dto::invite(&invite))
}

async fn list_invites(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: WorkspaceId = parse_id(id, "workspace")?;
    let invites = state.workspaces.list_invites(p, id).await?;
    ok(json!(invites.iter().map(dto::invite).collect::<Vec<_>>()))
}

async fn revoke_invite(
    state: &AppState,
    p: &Principal,
    id: &str,
    invite_id: &str,
) -> HandlerResult {
    let id: WorkspaceId = parse_id(id, "workspace")?;
    let invite_id: UniqueId = parse_id(invite_id, "invite")?;
    state.workspaces.revoke_invite(p, id, invite_id).await?;
    no_content()
}

async fn accept_invite(state: &AppState, p: &Principal, token: &str) -> HandlerResult {
    let membership = state.workspaces.accept_invite(p, token).await?;
    ok(dto::workspace_membership(&membership))
}

// ============================================================================
// OAuth apps
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAppBody {
    name: String,
    description: Option<String>,
    client_type: String,
    redirect_uris: Vec<String>,
    allowed_scopes: String,
}

async fn create_app(
    state: &AppState,
    p: &Principal,
    id: &str,
    request: Request<Incoming>,
    client_ip: Option<&str>,
) -> HandlerResult {
    let id: WorkspaceId = parse_id(id, "workspace")?;
    let body: CreateAppBody = read_json(request.into_body()).await?;
    let client_type = match body.client_type.as_str() {
        "public" => ClientType::Public,
        "confidential" => ClientType::Confidential,
        other => {
            return Err(DomainError::Validation(format!(
                "Unknown clientType: {other}"
            )));
        }
    };
    let created_app = state
        .apps
        .create_app(
            p,
            client_ip,
            id,
            &body.name,
            body.description,
            client_type,
            body.redirect_uris,
            ScopeSet::parse(&body.allowed_scopes)?,
        )
        .await?;
    let mut payload = dto::oauth_app(&created_app.app);
    if let Some(secret) = created_app.client_secret {
        payload["clientSecret"] = json!(secret);
    }
    created(payload)
}

async fn list_apps(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: WorkspaceId = parse_id(id, "workspace")?;
    let apps = state.apps.list_apps(p, id).await?;
    ok(json!(apps.iter().map(dto::oauth_app).collect::<Vec<_>>()))
}

async fn get_app(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: AppId = parse_id(id, "app")?;
    let app = state.apps.get_app(p, id).await?;
    ok(dto::oauth_app(&app))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateAppBody {
    name: String,
    description: Option<String>,
    redirect_uris: Vec<String>,
    allowed_scopes: String,
}

async fn update_app(
    state: &AppState,
    p: &Principal,
    id: &str,
    request: Request<Incoming>,
    client_ip: Option<&str>,
) -> HandlerResult {
    let id: AppId = parse_id(id, "app")?;
    let body: UpdateAppBody = read_json(request.into_body()).await?;
    let app = state
        .apps
        .update_app(
            p,
            client_ip,
            id,
            &body.name,
            body.description,
            body.redirect_uris,
            ScopeSet::parse(&body.allowed_scopes)?,
        )
        .await?;
    ok(dto::oauth_app(&app))
}

async fn set_app_enabled(
    state: &AppState,
    p: &Principal,
    id: &str,
    enabled: bool,
    client_ip: Option<&str>,
) -> HandlerResult {
    let id: AppId = parse_id(id, "app")?;
    let app = state.apps.set_enabled(p, client_ip, id, enabled).await?;
    ok(dto::oauth_app(&app))
}

async fn rotate_app_secret(
    state: &AppState,
    p: &Principal,
    id: &str,
    client_ip: Option<&str>,
) -> HandlerResult {
    let id: AppId = parse_id(id, "app")?;
    let secret = state.apps.rotate_secret(p, client_ip, id).await?;
    ok(json!({"clientSecret": secret}))
}

async fn delete_app(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: AppId = parse_id(id, "app")?;
    state.apps.delete_app(p, id).await?;
    no_content()
}

async fn app_audit_logs(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: AppId = parse_id(id, "app")?;
    let entries = state.apps.audit_log(p, id, AUDIT_LOG_LIMIT).await?;
    ok(json!(entries.iter().map(dto::audit_entry).collect::<Vec<_>>()))
}

// ============================================================================
// PATs
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePatBody {
    name: String,
    description: Option<String>,
    scopes: String,
    expires_in_days: Option<i64>,
}

async fn create_pat(
    state: &AppState,
    p: &Principal,
    id: &str,
    request: Request<Incoming>,
    client_ip: Option<&str>,
) -> HandlerResult {
    let id: WorkspaceId = parse_id(id, "workspace")?;
    let body: CreatePatBody = read_json(request.into_body()).await?;
    let created_pat = state
        .pats
        .create(
            p,
            client_ip,
            id,
            &body.name,
            body.description,
            ScopeSet::parse(&body.scopes)?,
            body.expires_in_days,
        )
        .await?;
    let mut payload = dto::pat(&created_pat.pat);
    payload["token"] = json!(created_pat.wire_token);
    created(payload)
}

async fn list_pats(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: WorkspaceId = parse_id(id, "workspace")?;
    let pats = state.pats.list(p, id).await?;
    ok(json!(pats.iter().map(dto::pat).collect::<Vec<_>>()))
}

async fn update_pat(
    state: &AppState,
    p: &Principal,
    id: &str,
    request: Request<Incoming>,
    client_ip: Option<&str>,
) -> HandlerResult {
    let id: PatId = parse_id(id, "token")?;
    let body: NameBody = read_json(request.into_body()).await?;
    let pat = state
        .pats
        .update(p, client_ip, id, &body.name, body.description)
        .await?;
    ok(dto::pat(&pat))
}

async fn revoke_pat(
    state: &AppState,
    p: &Principal,
    id: &str,
    client_ip: Option<&str>,
) -> HandlerResult {
    let id: PatId = parse_id(id, "token")?;
    let pat = state.pats.revoke(p, client_ip, id).await?;
    ok(dto::pat(&pat))
}

async fn pat_audit_logs(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: PatId = parse_id(id, "token")?;
    let entries = state.pats.audit_log(p, id, AUDIT_LOG_LIMIT).await?;
    ok(json!(entries.iter().map(dto::audit_entry).collect::<Vec<_>>()))
}

// ============================================================================
// Projects
// ============================================================================

async fn create_project(
    state: &AppState,
    p: &Principal,
    id: &str,
    request: Request<Incoming>,
) -> HandlerResult {
    let id: WorkspaceId = parse_id(id, "workspace")?;
    let body: NameBody = read_json(request.into_body()).await?;
    let project = state
        .projects
        .create_project(p, id, &body.name, body.description)
        .await?;
    created(dto::project(&project))
}

async fn list_projects(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: WorkspaceId = parse_id(id, "workspace")?;
    let projects = state.projects.list_projects(p, id).await?;
    ok(json!(projects.iter().map(dto::project).collect::<Vec<_>>()))
}

async fn get_project(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: ProjectId = parse_id(id, "project")?;
    let project = state.projects.get_project(p, id).await?;
    ok(dto::project(&project))
}

async fn update_project(
    state: &AppState,
    p: &Principal,
    id: &str,
    request: Request<Incoming>,
) -> HandlerResult {
    let id: ProjectId = parse_id(id, "project")?;
    let body: NameBody = read_json(request.into_body()).await?;
    let project = state
        .projects
        .update_project(p, id, &body.name, body.description)
        .await?;
    ok(dto::project(&project))
}

async fn project_usage(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: ProjectId = parse_id(id, "project")?;
    let usage = state.files.project_usage(p, id).await?;
    ok(dto::usage(&usage))
}

async fn list_project_members(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: ProjectId = parse_id(id, "project")?;
    let members = state.projects.list_members(p, id).await?;
    ok(json!(members
        .iter()
        .map(dto::project_membership)
        .collect::<Vec<_>>()))
}

async fn set_project_member(
    state: &AppState,
    p: &Principal,
    id: &str,
    user_id: &str,
    request: Request<Incoming>,
) -> HandlerResult {
    let id: ProjectId = parse_id(id, "project")?;
    let user_id: UserId = parse_id(user_id, "membership")?;
    let body: RoleBody = read_json(request.into_body()).await?;
    let membership = state
        .projects
        .set_member_role(p, id, user_id, parse_project_role(&body.role)?)
        .await?;
    ok(dto::project_membership(&membership))
}

async fn remove_project_member(
    state: &AppState,
    p: &Principal,
    id: &str,
    user_id: &str,
) -> HandlerResult {
    let id: ProjectId = parse_id(id, "project")?;
    let user_id: UserId = parse_id(user_id, "membership")?;
    state.projects.remove_member(p, id, user_id).await?;
    no_content()
}

// ============================================================================
// Uploads
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReserveBody {
    file_name: String,
    content_type: Option<String>,
    expected_size_bytes: Option<u64>,
    #[serde(default)]
    prefer_direct_upload: bool,
}

async fn reserve_upload(
    state: &AppState,
    p: &Principal,
    id: &str,
    request: Request<Incoming>,
) -> HandlerResult {
    state
        .limiter
        .check(LimitedEndpoint::UploadReserve, &p.user_id.to_string())?;
    let id: ProjectId = parse_id(id, "project")?;
    let body: ReserveBody = read_json(request.into_body()).await?;
    let outcome = state
        .uploads
        .reserve(
            p,
            id,
            ReserveRequest {
                file_name: body.file_name,
                content_type: body.content_type,
                expected_size_bytes: body.expected_size_bytes,
                prefer_direct_upload: body.prefer_direct_upload,
            },
        )
        .await?;
    created(json!({
        "session": dto::upload_session(&outcome.session),
        "constraints": {
            "maxFileSizeBytes": outcome.max_file_size_bytes,
            "sessionExpiresAt": outcome.session.expires_at().to_rfc3339(),
        },
    }))
}

async fn upload_content(
    state: &AppState,
    p: &Principal,
    id: &str,
    session_id: &str,
    request: Request<Incoming>,
) -> HandlerResult {
    state
        .limiter
        .check(LimitedEndpoint::UploadContent, &p.user_id.to_string())?;
    let id: ProjectId = parse_id(id, "project")?;
    let session_id: UploadId = parse_id(session_id, "upload session")?;

    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let max = state.config.uploads.max_file_size_bytes;

    let session = if content_type.starts_with("multipart/form-data") {
        // Multipart arrives buffered; the file field becomes the stream
        let bytes = read_limited(request.into_body(), max as usize + MAX_JSON_BYTES)
            .await
            .map_err(|_| DomainError::Validation("Upload body too large".to_string()))?;
        let content = multipart_file(&content_type, &bytes).ok_or_else(|| {
            DomainError::Validation("Missing multipart field 'file'".to_string())
        })?;
        let declared = Some(content.len() as u64);
        let mut reader: wexhub_core::ports::blob_store::BlobReader =
            Box::new(std::io::Cursor::new(content));
        state
            .uploads
            .upload_content(p, id, session_id, declared, &mut reader)
            .await?
    } else {
        // Raw bodies stream straight through to the blob store
        let mut reader = BodyReader::new(request.into_body()).into_blob_reader();
        state
            .uploads
            .upload_content(p, id, session_id, declared, &mut reader)
            .await?
    };
    ok(json!({"session": dto::upload_session(&session)}))
}

async fn commit_upload(
    state: &AppState,
    p: &Principal,
    id: &str,
    session_id: &str,
) -> HandlerResult {
    state
        .limiter
        .check(LimitedEndpoint::UploadCommit, &p.user_id.to_string())?;
    let id: ProjectId = parse_id(id, "project")?;
    let session_id: UploadId = parse_id(session_id, "upload session")?;
    let outcome = state.uploads.commit(p, id, session_id).await?;
    ok(json!({
        "session": dto::upload_session(&outcome.session),
        "file": dto::file(&outcome.file),
    }))
}

// ============================================================================
// Files
// ============================================================================

async fn list_files(
    state: &AppState,
    p: &Principal,
    id: &str,
    query: Option<&str>,
) -> HandlerResult {
    let id: ProjectId = parse_id(id, "project")?;
    let params = query_params(query);
    let kind = match query_get(&params, "kind") {
        Some("source") => Some(FileKind::Source),
        Some("artifact") => Some(FileKind::Artifact),
        Some(other) => {
            return Err(DomainError::Validation(format!("Unknown kind: {other}")));
        }
        None => None,
    };
    let category = match query_get(&params, "category") {
        Some("ifc") => Some(FileCategory::Ifc),
        Some("wexbim") => Some(FileCategory::WexBim),
        Some("properties") => Some(FileCategory::Properties),
        Some("other") => Some(FileCategory::Other),
        Some(other) => {
            return Err(DomainError::Validation(format!("Unknown category: {other}")));
        }
        None => None,
    };
    let page = state
        .files
        .list_files(p, id, FileListFilter { kind, category }, page_request(&params))
        .await?;
    ok(dto::page(&page, dto::file))
}

async fn get_file(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: FileId = parse_id(id, "file")?;
    let file = state.files.get_file(p, id).await?;
    ok(dto::file(&file))
}

async fn download_file(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: FileId = parse_id(id, "file")?;
    let download = state.files.download(p, id).await?;
    Ok(attachment_response(
        download.file.content_type(),
        download.file.name(),
        download.reader,
    ))
}

async fn delete_file(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: FileId = parse_id(id, "file")?;
    let file = state.files.soft_delete(p, id).await?;
    ok(dto::file(&file))
}

/// Streams a blob as an attachment download
fn attachment_response(
    content_type: &str,
    file_name: &str,
    reader: wexhub_core::ports::blob_store::BlobReader,
) -> Response<HttpBody> {
    let mut response = Response::new(ReaderBody::new(reader).boxed());
    let content_type = if content_type.is_empty() {
        "application/octet-stream"
    } else {
        content_type
    };
    if let Ok(value) = HeaderValue::from_str(content_type) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    // Quotes stripped from the name so the header stays parseable
    let safe_name = file_name.replace(['"', '\r', '\n'], "_");
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{safe_name}\"")) {
        response.headers_mut().insert(CONTENT_DISPOSITION, value);
    }
    response
}

// ============================================================================
// Models and versions
// ============================================================================

async fn create_model(
    state: &AppState,
    p: &Principal,
    id: &str,
    request: Request<Incoming>,
) -> HandlerResult {
    let id: ProjectId = parse_id(id, "project")?;
    let body: NameBody = read_json(request.into_body()).await?;
    let model = state
        .models
        .create_model(p, id, &body.name, body.description)
        .await?;
    created(dto::model(&model))
}

async fn list_models(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: ProjectId = parse_id(id, "project")?;
    let models = state.models.list_models(p, id).await?;
    ok(json!(models.iter().map(dto::model).collect::<Vec<_>>()))
}

async fn get_model(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: ModelId = parse_id(id, "model")?;
    let model = state.models.get_model(p, id).await?;
    ok(dto::model(&model))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateVersionBody {
    ifc_file_id: String,
}

async fn create_version(
    state: &AppState,
    p: &Principal,
    id: &str,
    request: Request<Incoming>,
) -> HandlerResult {
    let id: ModelId = parse_id(id, "model")?;
    let body: CreateVersionBody = read_json(request.into_body()).await?;
    let ifc_file_id = body
        .ifc_file_id
        .parse::<FileId>()
        .map_err(|_| DomainError::Validation("ifcFileId is not a valid id".to_string()))?;
    let version = state.models.create_version(p, id, ifc_file_id).await?;
    created(dto::model_version(&version))
}

async fn list_versions(
    state: &AppState,
    p: &Principal,
    id: &str,
    query: Option<&str>,
) -> HandlerResult {
    let id: ModelId = parse_id(id, "model")?;
    let params = query_params(query);
    let page = state.models.list_versions(p, id, page_request(&params)).await?;
    ok(dto::page(&page, dto::model_version))
}

async fn get_version(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: VersionId = parse_id(id, "model version")?;
    let version = state.models.get_version(p, id).await?;
    ok(dto::model_version(&version))
}

async fn download_wexbim(state: &AppState, p: &Principal, id: &str) -> HandlerResult {
    let id: VersionId = parse_id(id, "model version")?;
    let download = state.models.download_wexbim(p, id).await?;
    Ok(attachment_response(
        download.file.content_type(),
        download.file.name(),
        download.reader,
    ))
}

async fn query_properties(
    state: &AppState,
    p: &Principal,
    id: &str,
    query: Option<&str>,
) -> HandlerResult {
    let id: VersionId = parse_id(id, "model version")?;
    let params = query_params(query);
    let filter = PropertyFilter {
        entity_label: query_get(&params, "entityLabel").and_then(|v| v.parse().ok()),
        global_id: query_get(&params, "globalId").map(str::to_string),
        type_name: query_get(&params, "typeName").map(str::to_string),
        name: query_get(&params, "name").map(str::to_string),
        property_set_name: query_get(&params, "propertySetName").map(str::to_string),
    };
    let page = state
        .properties
        .query_elements(p, id, &filter, page_request(&params))
        .await?;
    ok(dto::page(&page, dto::element))
}

async fn get_element(
    state: &AppState,
    p: &Principal,
    id: &str,
    element_id: &str,
) -> HandlerResult {
    let id: VersionId = parse_id(id, "model version")?;
    let element_id: UniqueId = parse_id(element_id, "element")?;
    let entry = state.properties.get_element(p, id, element_id).await?;
    ok(dto::element_properties(&entry))
}
