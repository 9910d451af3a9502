//! # Job Orchestrator
//!
//! Conduit une demande de conversion de la soumission jusqu'à la complétion
//! persistée :
//! 1. Résolution du modèle de voix cible
//! 2. Upload de l'audio d'entrée et création du job (`Processing`)
//! 3. Inférence distante (création, polling, téléchargement)
//! 4. Upload du résultat et complétion du job (`Completed`)
//!
//! ## Gestion des erreurs
//! Chaque échec interrompt les étapes restantes et remonte à l'appelant.
//! Une fois le job créé, un échec est aussi écrit comme `Failed` (sauf si
//! `persist_failures` est désactivé), pour que le job atteigne un état
//! terminal consultable.
//!
//! ## Annulation
//! Le [`CancelSignal`] est consulté entre les étapes et interrompt les
//! attentes de lecture et d'inférence. Les écritures (`create_job`,
//! `complete_job`) vont toujours à leur terme : une annulation pendant la
//! création laisse un job connu, clos en échec juste après.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::cancel::CancelSignal;
use super::inference::{InferenceClient, InferenceStage};
use super::progress::{
    stage_checkpoint, ProgressListener, RunProgress, COMPLETE, INFERENCE_BAND,
    INPUT_UPLOAD_BAND, LABEL_COMPLETE, LABEL_CONVERTING, LABEL_DOWNLOADING,
    LABEL_FETCHING_MODEL, LABEL_SAVING, LABEL_UPLOADING_INPUT, MODEL_FETCHED,
    RESULT_UPLOAD_BAND,
};
use crate::domain::{BlobHandle, CallerId, JobId, ModelId};
use crate::infrastructure::database::DataStore;
use crate::infrastructure::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Écrit `Failed` sur le job après tout échec post-création
    pub persist_failures: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            persist_failures: true,
        }
    }
}

pub struct JobOrchestrator {
    store: Arc<dyn DataStore>,
    inference: Arc<InferenceClient>,
    config: OrchestratorConfig,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn DataStore>,
        inference: Arc<InferenceClient>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            inference,
            config,
        }
    }

    /// Crée un job de conversion et l'exécute jusqu'au bout.
    ///
    /// Chaque appel crée exactement un nouveau job ; relancer une conversion
    /// consiste à rappeler cette méthode.
    #[instrument(skip_all, fields(caller = %caller, model_id = %model_id, job_id = tracing::field::Empty))]
    pub async fn create_and_run(
        &self,
        caller: &CallerId,
        model_id: ModelId,
        input: Bytes,
        mime_type: Option<&str>,
        listener: Arc<dyn ProgressListener>,
        cancel: &CancelSignal,
    ) -> AppResult<JobId> {
        let progress = RunProgress::new(listener);

        // 0. Jeton vérifié avant tout appel réseau
        let token = self.inference.require_token()?;

        // 1. Résolution du modèle
        progress.label(LABEL_FETCHING_MODEL);
        let model = cancel
            .guard(self.store.get_model(model_id))
            .await?
            .ok_or(AppError::ModelNotFound(model_id))?;
        let locator = model.audio_locator()?.to_string();
        progress.report(MODEL_FETCHED);

        // 2. Upload de l'entrée et création du job
        cancel.check()?;
        progress.label(LABEL_UPLOADING_INPUT);
        let input_handle =
            BlobHandle::from_bytes(input.clone()).with_observer(progress.observer(INPUT_UPLOAD_BAND));
        let job_id = self
            .store
            .create_job(caller, model_id, input_handle)
            .await
            .map_err(|e| {
                error!("❌ Création du job impossible: {}", e);
                AppError::JobCreationFailed(e.user_message())
            })?;
        tracing::Span::current().record("job_id", tracing::field::display(job_id));
        progress.report(INPUT_UPLOAD_BAND.hi);
        progress.job_created(job_id);
        info!("🚀 Job {} créé, conversion en cours", job_id);

        // 3-4. Inférence puis complétion
        match self
            .convert_and_save(&token, job_id, input, &locator, mime_type, &progress, cancel)
            .await
        {
            Ok(()) => {
                progress.report(COMPLETE);
                progress.label(LABEL_COMPLETE);
                info!("✅ Job {} complété", job_id);
                Ok(job_id)
            }
            Err(e) => {
                warn!("⚠️  Job {} interrompu à {}%", job_id, progress.current());
                self.record_failure(job_id, &e).await;
                Err(e)
            }
        }
    }

    async fn convert_and_save(
        &self,
        token: &str,
        job_id: JobId,
        input: Bytes,
        locator: &str,
        mime_type: Option<&str>,
        progress: &RunProgress,
        cancel: &CancelSignal,
    ) -> AppResult<()> {
        cancel.check()?;
        progress.label(LABEL_CONVERTING);
        progress.report(INFERENCE_BAND.lo);

        let result = cancel
            .guard(
                self.inference
                    .convert_with_token(token, input, locator, mime_type, |stage| {
                        if stage == InferenceStage::Downloading {
                            progress.label(LABEL_DOWNLOADING);
                        }
                        if let Some(checkpoint) = stage_checkpoint(stage) {
                            progress.report(checkpoint);
                        }
                    }),
            )
            .await?;

        cancel.check()?;
        progress.label(LABEL_SAVING);
        let result_handle =
            BlobHandle::from_bytes(result).with_observer(progress.observer(RESULT_UPLOAD_BAND));
        self.store
            .complete_job(job_id, result_handle)
            .await
            .map_err(|e| AppError::ResultSaveFailed(e.user_message()))
    }

    /// Écrit l'échec sur le job ; un échec de cette écriture est seulement logué
    async fn record_failure(&self, job_id: JobId, cause: &AppError) {
        let reason = cause.user_message();
        if !self.config.persist_failures {
            warn!("⚠️  Job {} laissé en cours après échec: {}", job_id, reason);
            return;
        }

        match self.store.fail_job(job_id, &reason).await {
            Ok(()) => warn!("❌ Job {} marqué en échec: {}", job_id, reason),
            Err(e) => error!(
                "❌ Impossible d'enregistrer l'échec du job {} ({}): {}",
                job_id,
                cause.kind(),
                e
            ),
        }
    }
}
