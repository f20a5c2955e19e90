//! SQLite implementation of the audit repository port
//!
//! Two append-only tables, one per subject. The shared insert helper is
//! executor-generic so lifecycle writes can ride their domain
//! transaction while best-effort appends go straight to the pool.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use wexhub_core::domain::audit::{AuditEntry, AuditSubject};
use wexhub_core::domain::newtypes::{AppId, PatId};
use wexhub_core::ports::AuditRepository;

use crate::convert::{oauth_event_from, parse_datetime, pat_event_from};
use crate::SqliteStore;

/// Inserts one audit entry through any executor (pool or transaction)
pub(crate) async fn insert_audit<'e, E>(executor: E, entry: &AuditEntry) -> anyhow::Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let details = serde_json::to_string(entry.details())?;
    match entry.subject() {
        AuditSubject::OAuthApp { app_id, event } => {
            sqlx::query(
                "INSERT INTO oauth_app_audit \
                 (id, app_id, event_type, actor_user_id, timestamp, details, ip_address) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(entry.id().to_string())
            .bind(app_id.to_string())
            .bind(event.to_string())
            .bind(entry.actor_user_id().map(|u| u.to_string()))
            .bind(entry.timestamp().to_rfc3339())
            .bind(details)
            .bind(entry.ip_address())
            .execute(executor)
            .await?;
        }
        AuditSubject::Pat { pat_id, event } => {
            sqlx::query(
                "INSERT INTO pat_audit \
                 (id, pat_id, event_type, actor_user_id, timestamp, details, ip_address) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(entry.id().to_string())
            .bind(pat_id.to_string())
            .bind(event.to_string())
            .bind(entry.actor_user_id().map(|u| u.to_string()))
            .bind(entry.timestamp().to_rfc3339())
            .bind(details)
            .bind(entry.ip_address())
            .execute(executor)
            .await?;
        }
    }
    Ok(())
}

fn app_entry_from_row(row: &SqliteRow) -> anyhow::Result<AuditEntry> {
    let actor: Option<String> = row.get("actor_user_id");
    Ok(AuditEntry::from_parts(
        row.get::<String, _>("id").parse()?,
        AuditSubject::OAuthApp {
            app_id: row.get::<String, _>("app_id").parse()?,
            event: oauth_event_from(row.get("event_type"))?,
        },
        actor.map(|a| a.parse()).transpose()?,
        parse_datetime(row.get("timestamp"))?,
        serde_json::from_str(row.get("details"))?,
        row.get("ip_address"),
    ))
}

fn pat_entry_from_row(row: &SqliteRow) -> anyhow::Result<AuditEntry> {
    let actor: Option<String> = row.get("actor_user_id");
    Ok(AuditEntry::from_parts(
        row.get::<String, _>("id").parse()?,
        AuditSubject::Pat {
            pat_id: row.get::<String, _>("pat_id").parse()?,
            event: pat_event_from(row.get("event_type"))?,
        },
        actor.map(|a| a.parse()).transpose()?,
        parse_datetime(row.get("timestamp"))?,
        serde_json::from_str(row.get("details"))?,
        row.get("ip_address"),
    ))
}

#[async_trait::async_trait]
impl AuditRepository for SqliteStore {
    async fn append(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        insert_audit(self.pool(), entry).await
    }

    async fn list_for_app(&self, app_id: AppId, limit: u32) -> anyhow::Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM oauth_app_audit WHERE app_id = ? ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(app_id.to_string())
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(app_entry_from_row).collect()
    }

    async fn list_for_pat(&self, pat_id: PatId, limit: u32) -> anyhow::Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM pat_audit WHERE pat_id = ? ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(pat_id.to_string())
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(pat_entry_from_row).collect()
    }
}
