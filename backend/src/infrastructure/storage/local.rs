use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use super::{blob_url, content_key, copy_with_progress, is_valid_key, payload_of, BlobStore, StoredBlob};
use crate::domain::blob::BlobHandle;
use crate::infrastructure::error::{AppError, AppResult};

/// Stockage sur disque, un fichier par clé de contenu
pub struct LocalBlobStore {
    root: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    /// Crée le répertoire racine s'il n'existe pas
    pub async fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> AppResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!("📁 Stockage local initialisé dans {}", root.display());

        Ok(Self {
            root,
            base_url: base_url.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> AppResult<PathBuf> {
        if !is_valid_key(key) {
            return Err(AppError::InvalidInput(format!("Invalid blob key: {}", key)));
        }
        Ok(self.root.join(key))
    }
}

async fn write_partial(handle: &BlobHandle, bytes: &Bytes, partial: &Path) -> AppResult<()> {
    let mut file = tokio::fs::File::create(partial).await?;
    copy_with_progress(handle, bytes, &mut file).await?;
    file.sync_all().await?;
    Ok(())
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, handle: &BlobHandle) -> AppResult<StoredBlob> {
        let bytes = payload_of(handle)?;
        let key = content_key(bytes);
        let path = self.path_for(&key)?;

        if tokio::fs::try_exists(&path).await? {
            // Contenu identique déjà présent
            handle.report_upload_progress(100.0);
        } else {
            // Fichier temporaire propre à cette écriture
            let partial = self.root.join(format!("{}.{}.part", key, Uuid::new_v4()));
            let moved = match write_partial(handle, bytes, &partial).await {
                Ok(()) => tokio::fs::rename(&partial, &path)
                    .await
                    .map_err(AppError::from),
                Err(e) => Err(e),
            };

            if let Err(e) = moved {
                let _ = tokio::fs::remove_file(&partial).await;
                // Une écriture concurrente du même contenu a pu aboutir
                if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    return Err(e);
                }
            }
            debug!(key = %key, size = bytes.len(), "Blob écrit sur disque");
        }

        Ok(StoredBlob {
            url: blob_url(&self.base_url, &key),
            size: bytes.len() as u64,
            key,
        })
    }

    async fn get(&self, key: &str) -> AppResult<Option<Bytes>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().join("blobs"), "http://cdn.local")
            .await
            .unwrap();

        let stored = store
            .put(&BlobHandle::from_bytes(&b"converted"[..]))
            .await
            .unwrap();
        assert!(store.root().join(&stored.key).exists());
        assert_eq!(
            store.get(&stored.key).await.unwrap().unwrap(),
            Bytes::from_static(b"converted")
        );

        // Même contenu : pas de réécriture
        let again = store
            .put(&BlobHandle::from_bytes(&b"converted"[..]))
            .await
            .unwrap();
        assert_eq!(again, stored);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_of_same_content_both_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(
            LocalBlobStore::new(dir.path(), "http://cdn.local").await.unwrap(),
        );
        let payload = Bytes::from(vec![42u8; 4 * 1024 * 1024]);

        for _ in 0..5 {
            let first = tokio::spawn({
                let (store, payload) = (store.clone(), payload.clone());
                async move { store.put(&BlobHandle::from_bytes(payload)).await }
            });
            let second = tokio::spawn({
                let (store, payload) = (store.clone(), payload.clone());
                async move { store.put(&BlobHandle::from_bytes(payload)).await }
            });
            let (first, second) = tokio::join!(first, second);
            let (first, second) = (first.unwrap().unwrap(), second.unwrap().unwrap());

            assert_eq!(first, second);
            assert_eq!(store.get(&first.key).await.unwrap().unwrap(), payload);
            std::fs::remove_file(store.root().join(&first.key)).unwrap();
        }

        // Aucun fichier temporaire ne subsiste
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_get_unknown_or_invalid_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "http://cdn.local").await.unwrap();

        assert!(store.get(&content_key(b"missing")).await.unwrap().is_none());
        assert!(matches!(
            store.get("../secret").await,
            Err(AppError::InvalidInput(_))
        ));
    }
}
