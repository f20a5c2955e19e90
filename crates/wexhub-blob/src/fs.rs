//! Filesystem implementation of the blob store port

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use wexhub_core::domain::newtypes::StorageKey;
use wexhub_core::ports::blob_store::{BlobHealth, BlobReader, BlobStore, PresignedUpload};

/// Provider identifier reported in file rows and health checks
const PROVIDER_ID: &str = "fs";

/// Blob store over a local directory
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Creates a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create blob root {}", root.display()))?;
        Ok(Self { root })
    }

    /// Resolves a storage key to its path under the root
    ///
    /// Keys are validated at construction (no traversal, no absolute
    /// paths), so joining is safe.
    fn path_for(&self, key: &StorageKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Hidden sibling path used while a write is in flight
    fn part_path(&self, target: &Path) -> PathBuf {
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        target.with_file_name(format!(".{file_name}.{}.part", Uuid::new_v4().simple()))
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    async fn put(&self, key: &StorageKey, reader: &mut BlobReader) -> anyhow::Result<u64> {
        let target = self.path_for(key);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create blob directory for {key}"))?;
        }

        // Stream into a part file; the blob appears under its key only
        // after the rename, however the write ends
        let part = self.part_path(&target);
        let result = async {
            let mut file = fs::File::create(&part)
                .await
                .with_context(|| format!("Failed to create part file for {key}"))?;
            let written = tokio::io::copy(reader, &mut file)
                .await
                .with_context(|| format!("Failed to stream content for {key}"))?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&part, &target)
                .await
                .with_context(|| format!("Failed to finalize blob {key}"))?;
            Ok::<u64, anyhow::Error>(written)
        }
        .await;

        if result.is_err() {
            if let Err(e) = fs::remove_file(&part).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(key = %key, error = %e, "Failed to clean up part file");
                }
            }
        } else {
            debug!(key = %key, "Blob stored");
        }
        result
    }

    async fn get(&self, key: &StorageKey) -> anyhow::Result<BlobReader> {
        let file = fs::File::open(self.path_for(key))
            .await
            .with_context(|| format!("Failed to open blob {key}"))?;
        Ok(Box::new(file))
    }

    async fn exists(&self, key: &StorageKey) -> anyhow::Result<bool> {
        match fs::metadata(self.path_for(key)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to stat blob {key}")),
        }
    }

    async fn size(&self, key: &StorageKey) -> anyhow::Result<u64> {
        let meta = fs::metadata(self.path_for(key))
            .await
            .with_context(|| format!("Failed to stat blob {key}"))?;
        Ok(meta.len())
    }

    async fn delete(&self, key: &StorageKey) -> anyhow::Result<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete blob {key}")),
        }
    }

    async fn presign_put(
        &self,
        _key: &StorageKey,
        _expires_at: DateTime<Utc>,
    ) -> anyhow::Result<Option<PresignedUpload>> {
        // The filesystem cannot mint URLs; callers fall back to proxying
        Ok(None)
    }

    async fn health(&self) -> anyhow::Result<BlobHealth> {
        // Probe with a real write: a readable-but-full disk should fail
        let probe = self
            .root
            .join(format!(".health.{}", Uuid::new_v4().simple()));
        fs::write(&probe, b"ok")
            .await
            .context("Blob root is not writable")?;
        fs::remove_file(&probe).await.ok();

        Ok(BlobHealth {
            provider_id: PROVIDER_ID.to_string(),
            data: json!({
                "root": self.root.display().to_string(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn reader(bytes: &'static [u8]) -> BlobReader {
        Box::new(bytes)
    }

    async fn store() -> (tempfile::TempDir, FsBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("blobs")).unwrap();
        (dir, store)
    }

    fn key(s: &str) -> StorageKey {
        StorageKey::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (_dir, store) = store().await;
        let key = key("ws/proj/uploads/a.ifc");

        let written = store.put(&key, &mut reader(b"ifc-bytes")).await.unwrap();
        assert_eq!(written, 9);

        let mut out = Vec::new();
        store.get(&key).await.unwrap().read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"ifc-bytes");

        assert!(store.exists(&key).await.unwrap());
        assert_eq!(store.size(&key).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_put_replaces_previous_content() {
        let (_dir, store) = store().await;
        let key = key("ws/proj/uploads/a.ifc");
        store.put(&key, &mut reader(b"first")).await.unwrap();
        store.put(&key, &mut reader(b"second!")).await.unwrap();
        assert_eq!(store.size(&key).await.unwrap(), 7);
        assert_eq!(store.get_bytes(&key).await.unwrap(), b"second!");
    }

    #[tokio::test]
    async fn test_missing_blob_behaviors() {
        let (_dir, store) = store().await;
        let key = key("ws/proj/uploads/missing.ifc");
        assert!(!store.exists(&key).await.unwrap());
        assert!(store.get(&key).await.is_err());
        assert!(store.size(&key).await.is_err());
        // Deleting a missing blob is fine
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_no_part_files_remain_after_writes() {
        let (_dir, store) = store().await;
        let key = key("ws/proj/uploads/a.ifc");
        store.put(&key, &mut reader(b"data")).await.unwrap();

        let dir = store.path_for(&key).parent().unwrap().to_path_buf();
        let mut entries = tokio::fs::read_dir(dir).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["a.ifc"]);
    }

    #[tokio::test]
    async fn test_presign_unsupported() {
        let (_dir, store) = store().await;
        let grant = store
            .presign_put(&key("ws/proj/uploads/a.ifc"), Utc::now())
            .await
            .unwrap();
        assert!(grant.is_none());
    }

    #[tokio::test]
    async fn test_health_reports_provider() {
        let (_dir, store) = store().await;
        let health = store.health().await.unwrap();
        assert_eq!(health.provider_id, "fs");
        assert!(health.data["root"].as_str().unwrap().contains("blobs"));
    }
}
