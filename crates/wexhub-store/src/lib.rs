//! WexHub Store - SQLite persistence
//!
//! The sqlx-backed implementation of every repository port:
//! - Identity: users, workspaces, projects, memberships, invites
//! - Catalog: files, models, versions, extracted properties, usage
//! - Upload sessions
//! - OAuth apps, authorization codes, refresh-token families
//! - Personal access tokens
//! - Audit logs
//!
//! Single-winner semantics (code consumption, refresh revocation) are
//! conditional UPDATEs; lifecycle audit entries land in the same
//! transaction as their domain action.

mod audit;
mod catalog;
mod convert;
mod identity;
mod oauth;
mod pat;
mod pool;
mod uploads;

use sqlx::SqlitePool;
use thiserror::Error;

pub use pool::DatabasePool;

/// Errors raised by the store adapter
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not open or create the database
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    /// Schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be mapped back to its domain type
    #[error("Stored value could not be decoded: {0}")]
    Decode(String),
}

/// SQLite-backed implementation of the repository ports
///
/// One value implements all of them; hand out `Arc<SqliteStore>` clones
/// coerced to the individual port traits.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Creates a store over an initialized connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
