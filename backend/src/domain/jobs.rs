use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::blob::BlobHandle;
use crate::domain::model::ModelId;
use crate::domain::user::CallerId;
use crate::infrastructure::error::{AppError, AppResult};

pub type JobId = Uuid;

/// Statut persistant d'un job de conversion.
///
/// `Processing` est l'unique état initial ; `Completed` et `Failed` sont
/// terminaux et ne reviennent jamais à `Processing`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Processing {
        upload_time: DateTime<Utc>,
    },
    Completed {
        result: BlobHandle,
        upload_time: DateTime<Utc>,
        processing_time: DateTime<Utc>,
    },
    Failed {
        reason: String,
        upload_time: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
}

impl JobStatus {
    /// Le job attend encore une écriture terminale
    pub fn is_in_flight(&self) -> bool {
        matches!(self, JobStatus::Processing { .. })
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_in_flight()
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Processing { .. } => "processing",
            JobStatus::Completed { .. } => "completed",
            JobStatus::Failed { .. } => "failed",
        }
    }

    pub fn upload_time(&self) -> DateTime<Utc> {
        match self {
            JobStatus::Processing { upload_time }
            | JobStatus::Completed { upload_time, .. }
            | JobStatus::Failed { upload_time, .. } => *upload_time,
        }
    }
}

/// Représente une demande de conversion initiée par un utilisateur
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionJob {
    /// Identifiant unique, attribué par la couche de persistance
    pub id: JobId,
    #[serde(flatten)]
    pub status: JobStatus,
    /// Utilisateur ayant soumis la conversion
    pub creator: CallerId,
    /// Audio source stocké
    pub input_audio: BlobHandle,
    /// Modèle source (non utilisé par le pipeline)
    pub source_model_id: Option<ModelId>,
    /// Modèle de voix cible
    pub target_model_id: ModelId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversionJob {
    /// Crée un nouveau job en cours de traitement
    pub fn new(creator: CallerId, target_model_id: ModelId, input_audio: BlobHandle) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Processing { upload_time: now },
            creator,
            input_audio,
            source_model_id: None,
            target_model_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Unique transition vers `Completed`
    pub fn complete(&mut self, result: BlobHandle) -> AppResult<()> {
        let upload_time = self.ensure_processing("complete")?;
        let now = Utc::now();
        self.status = JobStatus::Completed {
            result,
            upload_time,
            processing_time: now,
        };
        self.updated_at = now;
        Ok(())
    }

    /// Transition vers `Failed`, raison déjà normalisée
    pub fn fail(&mut self, reason: impl Into<String>) -> AppResult<()> {
        let upload_time = self.ensure_processing("fail")?;
        let now = Utc::now();
        self.status = JobStatus::Failed {
            reason: reason.into(),
            upload_time,
            failed_at: now,
        };
        self.updated_at = now;
        Ok(())
    }

    fn ensure_processing(&self, action: &str) -> AppResult<DateTime<Utc>> {
        match &self.status {
            JobStatus::Processing { upload_time } => Ok(*upload_time),
            other => Err(AppError::Conflict(format!(
                "Cannot {} job {}: it is already {}",
                action,
                self.id,
                other.label()
            ))),
        }
    }

    pub fn is_owned_by(&self, caller: &CallerId) -> bool {
        &self.creator == caller
    }
}
