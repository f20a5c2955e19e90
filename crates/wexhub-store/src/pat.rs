//! SQLite implementation of the PAT repository port

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use wexhub_core::domain::audit::AuditEntry;
use wexhub_core::domain::newtypes::{PatId, UserId, WorkspaceId};
use wexhub_core::domain::pat::PersonalAccessToken;
use wexhub_core::domain::scope::ScopeSet;
use wexhub_core::ports::PatRepository;

use crate::audit::insert_audit;
use crate::convert::{parse_datetime, parse_optional_datetime};
use crate::SqliteStore;

fn pat_from_row(row: &SqliteRow) -> anyhow::Result<PersonalAccessToken> {
    Ok(PersonalAccessToken::from_parts(
        row.get::<String, _>("id").parse()?,
        row.get::<String, _>("workspace_id").parse()?,
        row.get::<String, _>("user_id").parse()?,
        row.get("name"),
        row.get("description"),
        row.get("token_prefix"),
        row.get("token_hash"),
        ScopeSet::parse(row.get("scopes"))?,
        row.get::<i64, _>("is_revoked") != 0,
        parse_optional_datetime(row.get("revoked_at"))?,
        parse_optional_datetime(row.get("expires_at"))?,
        parse_optional_datetime(row.get("last_used_at"))?,
        parse_datetime(row.get("created_at"))?,
    ))
}

#[async_trait::async_trait]
impl PatRepository for SqliteStore {
    async fn create_pat(
        &self,
        pat: &PersonalAccessToken,
        audit: &AuditEntry,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "INSERT INTO pats \
             (id, workspace_id, user_id, name, description, token_prefix, token_hash, \
              scopes, is_revoked, revoked_at, expires_at, last_used_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(pat.id().to_string())
        .bind(pat.workspace_id().to_string())
        .bind(pat.user_id().to_string())
        .bind(pat.name())
        .bind(pat.description())
        .bind(pat.token_prefix())
        .bind(pat.token_hash())
        .bind(pat.scopes().to_string())
        .bind(pat.is_revoked() as i64)
        .bind(pat.revoked_at().map(|t| t.to_rfc3339()))
        .bind(pat.expires_at().map(|t| t.to_rfc3339()))
        .bind(pat.last_used_at().map(|t| t.to_rfc3339()))
        .bind(pat.created_at().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        insert_audit(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_pat(&self, id: PatId) -> anyhow::Result<Option<PersonalAccessToken>> {
        sqlx::query("SELECT * FROM pats WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?
            .map(|row| pat_from_row(&row))
            .transpose()
    }

    async fn get_pat_by_prefix(
        &self,
        prefix: &str,
    ) -> anyhow::Result<Option<PersonalAccessToken>> {
        sqlx::query("SELECT * FROM pats WHERE token_prefix = ?")
            .bind(prefix)
            .fetch_optional(self.pool())
            .await?
            .map(|row| pat_from_row(&row))
            .transpose()
    }

    async fn list_pats(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
    ) -> anyhow::Result<Vec<PersonalAccessToken>> {
        let rows = sqlx::query(
            "SELECT * FROM pats WHERE workspace_id = ? AND user_id = ? \
             ORDER BY created_at DESC",
        )
        .bind(workspace_id.to_string())
        .bind(user_id.to_string())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(pat_from_row).collect()
    }

    async fn update_pat(
        &self,
        pat: &PersonalAccessToken,
        audit: &AuditEntry,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "UPDATE pats SET name = ?, description = ?, is_revoked = ?, revoked_at = ? \
             WHERE id = ?",
        )
        .bind(pat.name())
        .bind(pat.description())
        .bind(pat.is_revoked() as i64)
        .bind(pat.revoked_at().map(|t| t.to_rfc3339()))
        .bind(pat.id().to_string())
        .execute(&mut *tx)
        .await?;
        insert_audit(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn touch_last_used(&self, id: PatId, at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE pats SET last_used_at = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
