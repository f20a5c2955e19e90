//! Upload session repository port (driven/secondary port)

use crate::domain::newtypes::UploadId;
use crate::domain::upload::UploadSession;

/// Port trait for upload session persistence
///
/// Sessions are small rows mutated through their state machine; the
/// repository persists whatever state the machine produced, including
/// lazily-expired sessions observed on read.
#[async_trait::async_trait]
pub trait UploadRepository: Send + Sync {
    /// Inserts a freshly reserved session
    async fn create_session(&self, session: &UploadSession) -> anyhow::Result<()>;

    /// Retrieves a session by id
    async fn get_session(&self, id: UploadId) -> anyhow::Result<Option<UploadSession>>;

    /// Persists a session after a state transition
    async fn update_session(&self, session: &UploadSession) -> anyhow::Result<()>;
}
