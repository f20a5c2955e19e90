//! SQLite implementation of the upload session repository port

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use wexhub_core::domain::newtypes::{StorageKey, UploadId};
use wexhub_core::domain::upload::UploadSession;
use wexhub_core::ports::UploadRepository;

use crate::convert::{
    parse_datetime, parse_optional_datetime, upload_mode_from, upload_status_from,
};
use crate::SqliteStore;

fn session_from_row(row: &SqliteRow) -> anyhow::Result<UploadSession> {
    let expected: Option<i64> = row.get("expected_size_bytes");
    let committed: Option<String> = row.get("committed_file_id");
    Ok(UploadSession::from_parts(
        row.get::<String, _>("id").parse()?,
        row.get::<String, _>("project_id").parse()?,
        row.get("file_name"),
        row.get("content_type"),
        expected.map(|v| v as u64),
        upload_status_from(row.get("status"))?,
        upload_mode_from(row.get("upload_mode"))?,
        StorageKey::new(row.get::<String, _>("temp_storage_key"))?,
        row.get("direct_upload_url"),
        committed.map(|s| s.parse()).transpose()?,
        parse_datetime(row.get("created_at"))?,
        parse_datetime(row.get("expires_at"))?,
    ))
}

#[async_trait::async_trait]
impl UploadRepository for SqliteStore {
    async fn create_session(&self, session: &UploadSession) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO upload_sessions \
             (id, project_id, file_name, content_type, expected_size_bytes, status, \
              upload_mode, temp_storage_key, direct_upload_url, committed_file_id, \
              created_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id().to_string())
        .bind(session.project_id().to_string())
        .bind(session.file_name())
        .bind(session.content_type())
        .bind(session.expected_size_bytes().map(|v| v as i64))
        .bind(session.status().to_string())
        .bind(session.upload_mode().to_string())
        .bind(session.temp_storage_key().as_str())
        .bind(session.direct_upload_url())
        .bind(session.committed_file_id().map(|f| f.to_string()))
        .bind(session.created_at().to_rfc3339())
        .bind(session.expires_at().to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_session(&self, id: UploadId) -> anyhow::Result<Option<UploadSession>> {
        sqlx::query("SELECT * FROM upload_sessions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?
            .map(|row| session_from_row(&row))
            .transpose()
    }

    async fn update_session(&self, session: &UploadSession) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE upload_sessions SET status = ?, committed_file_id = ? WHERE id = ?",
        )
        .bind(session.status().to_string())
        .bind(session.committed_file_id().map(|f| f.to_string()))
        .bind(session.id().to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
