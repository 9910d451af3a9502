use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::blob::BlobHandle;
use crate::domain::user::CallerId;
use crate::infrastructure::error::{AppError, AppResult};

pub type ModelId = Uuid;

/// Métadonnées saisies par l'utilisateur lors de l'upload d'un modèle de voix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ModelMetadata {
    #[validate(length(min = 1, max = 100, message = "Model name must be between 1 and 100 characters"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 1000, message = "Description is too long"))]
    pub description: String,
    /// Format du fichier de référence (ex: "zip", "pth")
    #[serde(default)]
    pub format: String,
    /// Description libre des données d'entraînement
    #[serde(default)]
    pub training_data: String,
}

/// Référence nommée vers un audio de référence déjà stocké
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceModel {
    pub id: ModelId,
    pub owner: CallerId,
    pub metadata: ModelMetadata,
    pub storage: BlobHandle,
    pub created_at: DateTime<Utc>,
}

impl VoiceModel {
    pub fn new(owner: CallerId, metadata: ModelMetadata, storage: BlobHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            metadata,
            storage,
            created_at: Utc::now(),
        }
    }

    /// URL directement téléchargeable de l'audio du modèle
    pub fn audio_locator(&self) -> AppResult<&str> {
        match self.storage.direct_url() {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(AppError::InvalidModel(format!(
                "Voice model '{}' has no downloadable audio",
                self.metadata.name
            ))),
        }
    }
}
