//! Audit repository port (driven/secondary port)
//!
//! Standalone appends for best-effort events (e.g. PAT `Used`) and the
//! query side of the audit log. Lifecycle events that must ride a domain
//! transaction go through the token repository methods instead.

use crate::domain::audit::AuditEntry;
use crate::domain::newtypes::{AppId, PatId};

/// Port trait for audit log persistence
#[async_trait::async_trait]
pub trait AuditRepository: Send + Sync {
    /// Appends one entry outside any domain transaction
    async fn append(&self, entry: &AuditEntry) -> anyhow::Result<()>;

    /// Lists an app's audit entries, newest first
    async fn list_for_app(&self, app_id: AppId, limit: u32) -> anyhow::Result<Vec<AuditEntry>>;

    /// Lists a PAT's audit entries, newest first
    async fn list_for_pat(&self, pat_id: PatId, limit: u32) -> anyhow::Result<Vec<AuditEntry>>;
}
