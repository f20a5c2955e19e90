//! AuditRecorder - the audit trail surface for services
//!
//! Queries pass through to the repository; detached appends (events that
//! do not ride a domain transaction, like PAT usage) are non-fatal:
//! persistence errors are logged via `tracing::warn!` and never
//! propagated, so audit trouble cannot break authentication.

use std::sync::Arc;

use wexhub_core::domain::audit::AuditEntry;
use wexhub_core::domain::newtypes::{AppId, PatId};
use wexhub_core::ports::AuditRepository;

/// Query and best-effort append surface over the audit log
pub struct AuditRecorder {
    repo: Arc<dyn AuditRepository>,
}

impl AuditRecorder {
    pub fn new(repo: Arc<dyn AuditRepository>) -> Self {
        Self { repo }
    }

    /// Appends an entry outside any transaction, swallowing errors
    pub async fn append_detached(&self, entry: &AuditEntry) {
        if let Err(e) = self.repo.append(entry).await {
            tracing::warn!(error = %e, "Failed to append audit entry");
        }
    }

    /// Lists an app's audit entries, newest first
    pub async fn for_app(&self, app_id: AppId, limit: u32) -> anyhow::Result<Vec<AuditEntry>> {
        self.repo.list_for_app(app_id, limit).await
    }

    /// Lists a PAT's audit entries, newest first
    pub async fn for_pat(&self, pat_id: PatId, limit: u32) -> anyhow::Result<Vec<AuditEntry>> {
        self.repo.list_for_pat(pat_id, limit).await
    }
}
