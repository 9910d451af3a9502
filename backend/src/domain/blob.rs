//! # Blob Handle
//!
//! Référence opaque vers un contenu binaire (audio source, modèle de voix,
//! résultat converti). Un handle est soit porteur des octets bruts (avant
//! upload), soit une URL directement téléchargeable (après stockage).
//!
//! Le handle est immuable une fois construit, à l'exception de l'observateur
//! de progression qui est notifié pendant tout upload déclenché par le handle.

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Observateur de progression d'upload (pourcentage 0-100)
pub type UploadObserver = Arc<dyn Fn(f32) + Send + Sync>;

#[derive(Clone, PartialEq, Eq)]
enum BlobPayload {
    Bytes(Bytes),
    Url(String),
}

#[derive(Clone)]
pub struct BlobHandle {
    payload: BlobPayload,
    on_upload: Option<UploadObserver>,
}

impl BlobHandle {
    /// Construit un handle à partir d'octets bruts
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            payload: BlobPayload::Bytes(bytes.into()),
            on_upload: None,
        }
    }

    /// Construit un handle à partir d'une URL directement téléchargeable
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            payload: BlobPayload::Url(url.into()),
            on_upload: None,
        }
    }

    /// Attache un observateur de progression pour les uploads futurs
    pub fn with_upload_progress<F>(self, observer: F) -> Self
    where
        F: Fn(f32) + Send + Sync + 'static,
    {
        self.with_observer(Arc::new(observer))
    }

    pub fn with_observer(mut self, observer: UploadObserver) -> Self {
        self.on_upload = Some(observer);
        self
    }

    /// Octets bruts, si le handle n'a pas encore été stocké
    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.payload {
            BlobPayload::Bytes(bytes) => Some(bytes),
            BlobPayload::Url(_) => None,
        }
    }

    /// URL directe, si le contenu est déjà stocké
    pub fn direct_url(&self) -> Option<&str> {
        match &self.payload {
            BlobPayload::Url(url) => Some(url.as_str()),
            BlobPayload::Bytes(_) => None,
        }
    }

    pub fn len(&self) -> Option<usize> {
        self.bytes().map(Bytes::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Notifie l'observateur (appelé par les implémentations de stockage)
    pub fn report_upload_progress(&self, percentage: f32) {
        if let Some(observer) = &self.on_upload {
            observer(percentage.clamp(0.0, 100.0));
        }
    }
}

impl PartialEq for BlobHandle {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

impl fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("BlobHandle");
        match &self.payload {
            BlobPayload::Bytes(bytes) => debug.field("bytes", &bytes.len()),
            BlobPayload::Url(url) => debug.field("url", url),
        };
        debug.field("observed", &self.on_upload.is_some()).finish()
    }
}

#[derive(Serialize)]
struct BlobRef<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<usize>,
}

#[derive(Deserialize)]
struct OwnedBlobRef {
    url: String,
}

impl Serialize for BlobHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        BlobRef {
            url: self.direct_url(),
            size: self.len(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BlobHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let blob = OwnedBlobRef::deserialize(deserializer)?;
        Ok(BlobHandle::from_url(blob.url))
    }
}
