//! # Blob Storage
//!
//! Stockage adressé par contenu des audios (entrées, modèles, résultats).
//! Chaque contenu est identifié par l'empreinte SHA-256 de ses octets et
//! exposé via une URL directe `{base}/blobs/{key}`.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::blob::BlobHandle;
use crate::infrastructure::error::{AppError, AppResult};

pub mod local;

pub use local::LocalBlobStore;

/// Taille des blocs écrits entre deux notifications de progression
pub const UPLOAD_CHUNK_SIZE: usize = 256 * 1024;

/// Contenu stocké et sa référence publique
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredBlob {
    pub key: String,
    pub url: String,
    pub size: u64,
}

impl StoredBlob {
    pub fn into_handle(self) -> BlobHandle {
        BlobHandle::from_url(self.url)
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stocke les octets du handle en notifiant son observateur de 0 à 100
    async fn put(&self, handle: &BlobHandle) -> AppResult<StoredBlob>;

    async fn get(&self, key: &str) -> AppResult<Option<Bytes>>;
}

/// Clé de contenu : empreinte SHA-256 hexadécimale
pub fn content_key(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

pub fn is_valid_key(key: &str) -> bool {
    key.len() == 64 && key.bytes().all(|b| b.is_ascii_hexdigit())
}

pub(crate) fn blob_url(base_url: &str, key: &str) -> String {
    format!("{}/blobs/{}", base_url.trim_end_matches('/'), key)
}

pub(crate) fn payload_of(handle: &BlobHandle) -> AppResult<&Bytes> {
    handle
        .bytes()
        .ok_or_else(|| AppError::InvalidInput("Blob is already stored".to_string()))
}

/// Écrit `bytes` par blocs en rapportant la progression au handle
pub(crate) async fn copy_with_progress<W>(
    handle: &BlobHandle,
    bytes: &Bytes,
    writer: &mut W,
) -> AppResult<()>
where
    W: AsyncWrite + Unpin,
{
    let total = bytes.len();
    handle.report_upload_progress(0.0);

    let mut written = 0usize;
    for chunk in bytes.chunks(UPLOAD_CHUNK_SIZE) {
        writer.write_all(chunk).await?;
        written += chunk.len();
        handle.report_upload_progress(written as f32 * 100.0 / total as f32);
    }
    writer.flush().await?;

    if total == 0 {
        handle.report_upload_progress(100.0);
    }
    Ok(())
}

/// Stockage en mémoire (mode sans répertoire configuré et tests)
pub struct MemoryBlobStore {
    base_url: String,
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            blobs: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, handle: &BlobHandle) -> AppResult<StoredBlob> {
        let bytes = payload_of(handle)?;
        let key = content_key(bytes);

        let mut buffer = Vec::with_capacity(bytes.len());
        copy_with_progress(handle, bytes, &mut buffer).await?;
        self.blobs.write().await.insert(key.clone(), Bytes::from(buffer));

        debug!(key = %key, size = bytes.len(), "Blob stocké en mémoire");
        Ok(StoredBlob {
            url: blob_url(&self.base_url, &key),
            size: bytes.len() as u64,
            key,
        })
    }

    async fn get(&self, key: &str) -> AppResult<Option<Bytes>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }
}
