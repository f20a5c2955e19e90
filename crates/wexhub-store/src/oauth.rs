//! SQLite implementation of the OAuth repository port
//!
//! Code consumption and refresh revocation are conditional UPDATEs
//! predicated on `used_at IS NULL` / `revoked_at IS NULL`; the affected
//! row count tells the caller whether it won the race.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use wexhub_core::domain::audit::AuditEntry;
use wexhub_core::domain::newtypes::{AppId, UniqueId, WorkspaceId};
use wexhub_core::domain::oauth::{AuthorizationCode, OAuthApp, RefreshTokenRecord};
use wexhub_core::domain::scope::ScopeSet;
use wexhub_core::ports::OAuthRepository;

use crate::audit::insert_audit;
use crate::convert::{
    client_type_from, parse_datetime, parse_optional_datetime, pkce_method_from,
};
use crate::SqliteStore;

fn app_from_row(row: &SqliteRow) -> anyhow::Result<OAuthApp> {
    let redirect_uris: Vec<String> = serde_json::from_str(row.get("redirect_uris"))?;
    Ok(OAuthApp::from_parts(
        row.get::<String, _>("id").parse()?,
        row.get::<String, _>("workspace_id").parse()?,
        row.get("name"),
        row.get("description"),
        client_type_from(row.get("client_type"))?,
        row.get("client_id"),
        row.get("client_secret_hash"),
        redirect_uris,
        ScopeSet::parse(row.get("allowed_scopes"))?,
        row.get::<i64, _>("is_enabled") != 0,
        parse_datetime(row.get("created_at"))?,
        parse_datetime(row.get("updated_at"))?,
        row.get::<String, _>("created_by").parse()?,
    ))
}

fn code_from_row(row: &SqliteRow) -> anyhow::Result<AuthorizationCode> {
    let method: Option<String> = row.get("pkce_method");
    Ok(AuthorizationCode::from_parts(
        row.get("code"),
        row.get::<String, _>("app_id").parse()?,
        row.get::<String, _>("user_id").parse()?,
        row.get::<String, _>("workspace_id").parse()?,
        row.get("redirect_uri"),
        ScopeSet::parse(row.get("scopes"))?,
        row.get("pkce_challenge"),
        method.as_deref().map(pkce_method_from).transpose()?,
        parse_optional_datetime(row.get("used_at"))?,
        parse_datetime(row.get("expires_at"))?,
        parse_datetime(row.get("created_at"))?,
    ))
}

fn refresh_from_row(row: &SqliteRow) -> anyhow::Result<RefreshTokenRecord> {
    Ok(RefreshTokenRecord::from_parts(
        row.get("token_hash"),
        row.get::<String, _>("app_id").parse()?,
        row.get::<String, _>("user_id").parse()?,
        row.get::<String, _>("workspace_id").parse()?,
        ScopeSet::parse(row.get("scopes"))?,
        row.get::<String, _>("family_id").parse()?,
        row.get("previous_token_hash"),
        parse_optional_datetime(row.get("revoked_at"))?,
        parse_datetime(row.get("expires_at"))?,
        parse_datetime(row.get("created_at"))?,
        parse_optional_datetime(row.get("last_rotated_at"))?,
    ))
}

#[async_trait::async_trait]
impl OAuthRepository for SqliteStore {
    async fn create_app(&self, app: &OAuthApp, audit: &AuditEntry) -> anyhow::Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "INSERT INTO oauth_apps \
             (id, workspace_id, name, description, client_type, client_id, \
              client_secret_hash, redirect_uris, allowed_scopes, is_enabled, \
              created_at, updated_at, created_by) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(app.id().to_string())
        .bind(app.workspace_id().to_string())
        .bind(app.name())
        .bind(app.description())
        .bind(app.client_type().to_string())
        .bind(app.client_id())
        .bind(app.client_secret_hash())
        .bind(serde_json::to_string(app.redirect_uris())?)
        .bind(app.allowed_scopes().to_string())
        .bind(app.is_enabled() as i64)
        .bind(app.created_at().to_rfc3339())
        .bind(app.updated_at().to_rfc3339())
        .bind(app.created_by().to_string())
        .execute(&mut *tx)
        .await?;
        insert_audit(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_app(&self, id: AppId) -> anyhow::Result<Option<OAuthApp>> {
        sqlx::query("SELECT * FROM oauth_apps WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?
            .map(|row| app_from_row(&row))
            .transpose()
    }

    async fn get_app_by_client_id(&self, client_id: &str) -> anyhow::Result<Option<OAuthApp>> {
        sqlx::query("SELECT * FROM oauth_apps WHERE client_id = ?")
            .bind(client_id)
            .fetch_optional(self.pool())
            .await?
            .map(|row| app_from_row(&row))
            .transpose()
    }

    async fn list_apps(&self, workspace_id: WorkspaceId) -> anyhow::Result<Vec<OAuthApp>> {
        let rows = sqlx::query(
            "SELECT * FROM oauth_apps WHERE workspace_id = ? ORDER BY created_at DESC",
        )
        .bind(workspace_id.to_string())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(app_from_row).collect()
    }

    async fn update_app(&self, app: &OAuthApp, audit: &AuditEntry) -> anyhow::Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "UPDATE oauth_apps SET name = ?, description = ?, client_secret_hash = ?, \
             redirect_uris = ?, allowed_scopes = ?, is_enabled = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(app.name())
        .bind(app.description())
        .bind(app.client_secret_hash())
        .bind(serde_json::to_string(app.redirect_uris())?)
        .bind(app.allowed_scopes().to_string())
        .bind(app.is_enabled() as i64)
        .bind(app.updated_at().to_rfc3339())
        .bind(app.id().to_string())
        .execute(&mut *tx)
        .await?;
        insert_audit(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_app(&self, id: AppId) -> anyhow::Result<()> {
        // Codes, refresh tokens, and the audit log cascade via FKs
        sqlx::query("DELETE FROM oauth_apps WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn insert_code(&self, code: &AuthorizationCode) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO oauth_codes \
             (code, app_id, user_id, workspace_id, redirect_uri, scopes, \
              pkce_challenge, pkce_method, used_at, expires_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)",
        )
        .bind(code.code())
        .bind(code.app_id().to_string())
        .bind(code.user_id().to_string())
        .bind(code.workspace_id().to_string())
        .bind(code.redirect_uri())
        .bind(code.scopes().to_string())
        .bind(code.pkce_challenge())
        .bind(code.pkce_method().map(|m| m.as_str()))
        .bind(code.expires_at().to_rfc3339())
        .bind(code.created_at().to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_code(&self, code: &str) -> anyhow::Result<Option<AuthorizationCode>> {
        sqlx::query("SELECT * FROM oauth_codes WHERE code = ?")
            .bind(code)
            .fetch_optional(self.pool())
            .await?
            .map(|row| code_from_row(&row))
            .transpose()
    }

    async fn consume_code(&self, code: &str, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let result =
            sqlx::query("UPDATE oauth_codes SET used_at = ? WHERE code = ? AND used_at IS NULL")
                .bind(now.to_rfc3339())
                .bind(code)
                .execute(self.pool())
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_refresh_token(
        &self,
        token: &RefreshTokenRecord,
        audit: Option<&AuditEntry>,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "INSERT INTO refresh_tokens \
             (token_hash, app_id, user_id, workspace_id, scopes, family_id, \
              previous_token_hash, revoked_at, expires_at, created_at, last_rotated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(token.token_hash())
        .bind(token.app_id().to_string())
        .bind(token.user_id().to_string())
        .bind(token.workspace_id().to_string())
        .bind(token.scopes().to_string())
        .bind(token.family_id().to_string())
        .bind(token.previous_token_hash())
        .bind(token.revoked_at().map(|t| t.to_rfc3339()))
        .bind(token.expires_at().to_rfc3339())
        .bind(token.created_at().to_rfc3339())
        .bind(token.last_rotated_at().map(|t| t.to_rfc3339()))
        .execute(&mut *tx)
        .await?;
        if let Some(entry) = audit {
            insert_audit(&mut *tx, entry).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_refresh_token(
        &self,
        token_hash: &str,
    ) -> anyhow::Result<Option<RefreshTokenRecord>> {
        sqlx::query("SELECT * FROM refresh_tokens WHERE token_hash = ?")
            .bind(token_hash)
            .fetch_optional(self.pool())
            .await?
            .map(|row| refresh_from_row(&row))
            .transpose()
    }

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = ?, last_rotated_at = ? \
             WHERE token_hash = ? AND revoked_at IS NULL",
        )
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(token_hash)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_family(
        &self,
        family_id: UniqueId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = ? \
             WHERE family_id = ? AND revoked_at IS NULL",
        )
        .bind(now.to_rfc3339())
        .bind(family_id.to_string())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}
