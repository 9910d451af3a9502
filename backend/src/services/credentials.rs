//! # Credential Store
//!
//! Jeton API du service d'inférence, partagé par tout le processus.
//! Un jeton enregistré à l'exécution (persisté dans un fichier JSON) a
//! priorité sur celui de l'environnement.

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::RwLock;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::infrastructure::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize)]
struct SavedCredentials {
    replicate_api_token: String,
}

/// Origine du jeton actuellement utilisé
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    Saved,
    Environment,
    None,
}

pub struct CredentialStore {
    env_token: Option<String>,
    saved: RwLock<Option<String>>,
    file: Option<PathBuf>,
    changes: watch::Sender<u64>,
}

fn non_blank(token: Option<String>) -> Option<String> {
    token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

impl CredentialStore {
    /// Store sans fichier de persistance
    pub fn in_memory(env_token: Option<String>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            env_token: non_blank(env_token),
            saved: RwLock::new(None),
            file: None,
            changes,
        }
    }

    /// Charge le jeton enregistré depuis `file` s'il existe
    pub async fn load(env_token: Option<String>, file: Option<PathBuf>) -> AppResult<Self> {
        let mut store = Self::in_memory(env_token);

        if let Some(path) = &file {
            match tokio::fs::read(path).await {
                Ok(content) => {
                    let saved: SavedCredentials = serde_json::from_slice(&content).map_err(|e| {
                        AppError::Configuration(format!(
                            "Invalid credentials file {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                    store.saved = RwLock::new(non_blank(Some(saved.replicate_api_token)));
                    info!("🔑 Jeton API chargé depuis {}", path.display());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        store.file = file;
        Ok(store)
    }

    fn saved_token(&self) -> Option<String> {
        self.saved
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_saved(&self, token: Option<String>) {
        *self
            .saved
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
        self.changes.send_modify(|version| *version += 1);
    }

    /// Jeton configuré, ou chaîne vide
    pub fn token(&self) -> String {
        self.saved_token()
            .or_else(|| self.env_token.clone())
            .unwrap_or_default()
    }

    pub fn is_configured(&self) -> bool {
        !self.token().is_empty()
    }

    pub fn source(&self) -> TokenSource {
        if self.saved_token().is_some() {
            TokenSource::Saved
        } else if self.env_token.is_some() {
            TokenSource::Environment
        } else {
            TokenSource::None
        }
    }

    /// Enregistre un nouveau jeton (espaces retirés)
    pub async fn save(&self, token: &str) -> AppResult<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::InvalidInput("Token cannot be empty".to_string()));
        }

        if let Some(path) = &self.file {
            let content = serde_json::to_vec_pretty(&SavedCredentials {
                replicate_api_token: token.to_string(),
            })?;
            tokio::fs::write(path, content).await?;
        }

        self.set_saved(Some(token.to_string()));
        info!("🔑 Jeton API enregistré");
        Ok(())
    }

    /// Oublie le jeton enregistré (celui de l'environnement reste actif)
    pub async fn clear(&self) -> AppResult<()> {
        if let Some(path) = &self.file {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("⚠️  Impossible de supprimer {}: {}", path.display(), e);
                    return Err(e.into());
                }
            }
        }

        self.set_saved(None);
        info!("🔑 Jeton API enregistré supprimé");
        Ok(())
    }

    /// Notifié à chaque modification du jeton enregistré
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}
