//! Blob store port (driven/secondary port)
//!
//! Interface to the object/blob storage backend. The reference adapter is
//! a local filesystem store; cloud stores with pre-signed upload support
//! plug in behind the same trait.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific and
//!   don't need domain-level classification.
//! - `put`/`get` are streaming so request cancellation can abort an upload
//!   mid-transfer without buffering whole files in memory.
//! - `presign_put` returns `None` when the backend cannot mint pre-signed
//!   URLs; callers then fall back to server-proxied uploads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::domain::newtypes::StorageKey;

/// A readable blob content stream
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// A pre-signed direct upload grant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignedUpload {
    /// URL the client PUTs content to
    pub url: String,
    /// Instant the grant stops being honored
    pub expires_at: DateTime<Utc>,
}

/// Result of the storage liveness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobHealth {
    /// Identifier of the backing provider (e.g. "fs")
    pub provider_id: String,
    /// Provider-reported details, included verbatim in the health response
    pub data: serde_json::Value,
}

/// Port trait for blob storage operations
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Stable identifier of this storage provider
    fn provider_id(&self) -> &str;

    /// Streams content into the blob at `key`, replacing any previous
    /// content. Returns the number of bytes written.
    ///
    /// Implementations must not leave a partial blob visible under `key`
    /// when the stream errors or the task is cancelled.
    async fn put(&self, key: &StorageKey, reader: &mut BlobReader) -> anyhow::Result<u64>;

    /// Opens the blob at `key` for streaming reads
    async fn get(&self, key: &StorageKey) -> anyhow::Result<BlobReader>;

    /// Reads the whole blob into memory
    ///
    /// Convenience for the processing handlers, which hand complete
    /// buffers to the translators.
    async fn get_bytes(&self, key: &StorageKey) -> anyhow::Result<Vec<u8>> {
        let mut reader = self.get(key).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Returns true when a blob exists at `key`
    async fn exists(&self, key: &StorageKey) -> anyhow::Result<bool>;

    /// Returns the stored size of the blob at `key` in bytes
    async fn size(&self, key: &StorageKey) -> anyhow::Result<u64>;

    /// Deletes the blob at `key`; deleting a missing blob is not an error
    async fn delete(&self, key: &StorageKey) -> anyhow::Result<()>;

    /// Requests a pre-signed PUT URL valid until `expires_at`
    ///
    /// Returns `None` when the backend has no pre-signed upload support.
    async fn presign_put(
        &self,
        key: &StorageKey,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<Option<PresignedUpload>>;

    /// Probes backend liveness for the health endpoint
    async fn health(&self) -> anyhow::Result<BlobHealth>;
}
