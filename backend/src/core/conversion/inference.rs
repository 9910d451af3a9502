//! # Remote Inference Client
//!
//! Envoie l'audio d'entrée au service d'inférence, suit la prédiction
//! jusqu'à un état terminal puis télécharge l'audio converti.

use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderStringWriter;
use bytes::Bytes;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::PollSettings;
use crate::infrastructure::error::{AppError, AppResult};
use crate::infrastructure::replicate::{
    InferenceParameters, Prediction, PredictionApi, PredictionStatus,
};
use crate::services::credentials::CredentialStore;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Multiple de 3 : aucun padding intermédiaire entre deux blocs
const ENCODE_CHUNK_SIZE: usize = 3 * 64 * 1024;

/// Étape rapportée par [`InferenceClient::convert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceStage {
    Remote(PredictionStatus),
    Downloading,
}

/// Encode `bytes` en data URI base64, bloc par bloc
pub fn encode_data_uri(bytes: &[u8], mime_type: Option<&str>) -> AppResult<String> {
    let mime_type = mime_type
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_MIME_TYPE);

    let prefix = format!("data:{};base64,", mime_type);
    let mut writer = EncoderStringWriter::from_consumer(prefix, &STANDARD);
    for chunk in bytes.chunks(ENCODE_CHUNK_SIZE) {
        writer.write_all(chunk)?;
    }
    Ok(writer.into_inner())
}

/// Suivi local d'un polling : dernier statut vu et nombre de requêtes
struct PollTracker {
    last: Option<PredictionStatus>,
    attempts: u32,
}

impl PollTracker {
    fn new(initial: Option<PredictionStatus>) -> Self {
        Self {
            last: initial,
            attempts: 0,
        }
    }

    /// Enregistre un statut ; vrai s'il diffère du précédent
    fn observe(&mut self, status: PredictionStatus) -> bool {
        self.attempts += 1;
        if self.last == Some(status) {
            false
        } else {
            self.last = Some(status);
            true
        }
    }
}

fn remote_failure(prediction: &Prediction) -> AppError {
    AppError::RemoteConversionFailed {
        status: prediction.status.as_str().to_string(),
        reason: prediction.failure_reason(),
    }
}

fn result_locator(prediction: &Prediction) -> AppResult<&str> {
    prediction
        .output
        .as_ref()
        .ok_or_else(|| AppError::MalformedResponse("No output from Replicate".to_string()))?
        .first_locator()
        .ok_or_else(|| {
            AppError::MalformedResponse("Invalid output format from Replicate".to_string())
        })
}

pub struct InferenceClient {
    api: Arc<dyn PredictionApi>,
    credentials: Arc<CredentialStore>,
    parameters: InferenceParameters,
    poll: PollSettings,
}

impl InferenceClient {
    pub fn new(api: Arc<dyn PredictionApi>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            api,
            credentials,
            parameters: InferenceParameters::default(),
            poll: PollSettings::default(),
        }
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Jeton API courant ; erreur de configuration s'il est absent
    pub fn require_token(&self) -> AppResult<String> {
        let token = self.credentials.token();
        if token.trim().is_empty() {
            return Err(AppError::Configuration(
                "Replicate API token not configured. Please add your API token in Settings."
                    .to_string(),
            ));
        }
        Ok(token)
    }

    /// Convertit `input` avec le modèle situé à `model_locator`.
    ///
    /// `on_stage` reçoit le statut de création, chaque changement de statut
    /// pendant le polling, puis `Downloading` et enfin `Succeeded`.
    pub async fn convert<F>(
        &self,
        input: Bytes,
        model_locator: &str,
        mime_type: Option<&str>,
        on_stage: F,
    ) -> AppResult<Bytes>
    where
        F: FnMut(InferenceStage) + Send,
    {
        let token = self.require_token()?;
        self.convert_with_token(&token, input, model_locator, mime_type, on_stage)
            .await
    }

    #[instrument(skip_all, fields(input_size = input.len()))]
    pub async fn convert_with_token<F>(
        &self,
        token: &str,
        input: Bytes,
        model_locator: &str,
        mime_type: Option<&str>,
        mut on_stage: F,
    ) -> AppResult<Bytes>
    where
        F: FnMut(InferenceStage) + Send,
    {
        // 1. Validation des entrées
        if model_locator.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Voice model URL is required for conversion".to_string(),
            ));
        }
        if input.is_empty() {
            return Err(AppError::InvalidInput("Input audio is empty".to_string()));
        }

        // 2. Encodage hors du runtime async
        let mime_type = mime_type.map(str::to_string);
        let data_uri =
            tokio::task::spawn_blocking(move || encode_data_uri(&input, mime_type.as_deref()))
                .await??;

        // 3. Création de la prédiction
        let created = self
            .api
            .create_prediction(token, &data_uri, model_locator, &self.parameters)
            .await?;
        info!(prediction_id = %created.id, status = created.status.as_str(), "🚀 Conversion soumise");
        drop(data_uri);

        if created.status != PredictionStatus::Succeeded {
            on_stage(InferenceStage::Remote(created.status));
        }

        // 4. Attente d'un état terminal
        let finished = match created.status {
            PredictionStatus::Succeeded => created,
            PredictionStatus::Failed | PredictionStatus::Canceled => {
                return Err(remote_failure(&created))
            }
            _ => {
                self.poll_prediction(token, &created.id, Some(created.status), |status| {
                    if status != PredictionStatus::Succeeded {
                        on_stage(InferenceStage::Remote(status));
                    }
                })
                .await?
            }
        };

        // 5. Téléchargement du résultat
        let locator = result_locator(&finished)?;
        on_stage(InferenceStage::Downloading);
        let audio = self.api.download(locator).await?;
        info!(prediction_id = %finished.id, size = audio.len(), "✅ Audio converti téléchargé");

        on_stage(InferenceStage::Remote(PredictionStatus::Succeeded));
        Ok(audio)
    }

    /// Interroge la prédiction jusqu'à un état terminal.
    ///
    /// `on_status` n'est appelé qu'aux changements de statut ; un statut
    /// identique à `initial` n'est pas rapporté.
    #[instrument(skip(self, token, on_status))]
    pub async fn poll_prediction<F>(
        &self,
        token: &str,
        prediction_id: &str,
        initial: Option<PredictionStatus>,
        mut on_status: F,
    ) -> AppResult<Prediction>
    where
        F: FnMut(PredictionStatus) + Send,
    {
        let mut tracker = PollTracker::new(initial);

        for _ in 0..self.poll.max_attempts {
            tokio::time::sleep(self.poll.interval).await;
            let prediction = self.api.get_prediction(token, prediction_id).await?;

            if tracker.observe(prediction.status) {
                debug!(
                    status = prediction.status.as_str(),
                    attempt = tracker.attempts,
                    "Statut de prédiction modifié"
                );
                on_status(prediction.status);
            }

            if prediction.status.is_terminal() {
                if prediction.status == PredictionStatus::Succeeded {
                    return Ok(prediction);
                }
                warn!(
                    status = prediction.status.as_str(),
                    "❌ Prédiction terminée en échec"
                );
                return Err(remote_failure(&prediction));
            }
        }

        warn!(attempts = tracker.attempts, "⏱️ Budget de polling épuisé");
        Err(AppError::Timeout {
            attempts: tracker.attempts,
            waited: self.poll.budget(),
        })
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::infrastructure::replicate::PredictionOutput;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub const RESULT_URL: &str = "https://replicate.delivery/out.wav";

    pub fn prediction(status: PredictionStatus) -> Prediction {
        Prediction {
            id: "pred-1".to_string(),
            status,
            output: (status == PredictionStatus::Succeeded)
                .then(|| PredictionOutput::Single(RESULT_URL.to_string())),
            error: None,
        }
    }

    /// Service d'inférence scripté : réponse de création puis file de polls
    /// (le dernier élément est répété une fois la file vidée)
    pub struct ScriptedApi {
        created: Prediction,
        polls: Mutex<VecDeque<Prediction>>,
        pub result: Bytes,
        pub create_calls: AtomicUsize,
        pub poll_calls: AtomicUsize,
        pub downloads: AtomicUsize,
    }

    impl ScriptedApi {
        pub fn new(created: Prediction, polls: Vec<Prediction>) -> Self {
            Self {
                created,
                polls: Mutex::new(polls.into()),
                result: Bytes::from_static(b"converted-audio"),
                create_calls: AtomicUsize::new(0),
                poll_calls: AtomicUsize::new(0),
                downloads: AtomicUsize::new(0),
            }
        }

        pub fn statuses(created: PredictionStatus, polls: &[PredictionStatus]) -> Self {
            Self::new(
                prediction(created),
                polls.iter().copied().map(prediction).collect(),
            )
        }

        pub fn succeeding() -> Self {
            Self::statuses(PredictionStatus::Succeeded, &[])
        }
    }

    #[async_trait]
    impl PredictionApi for ScriptedApi {
        async fn create_prediction(
            &self,
            _token: &str,
            data_uri: &str,
            _model_locator: &str,
            _parameters: &InferenceParameters,
        ) -> AppResult<Prediction> {
            assert!(data_uri.starts_with("data:"));
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.created.clone())
        }

        async fn get_prediction(&self, _token: &str, _id: &str) -> AppResult<Prediction> {
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            let mut polls = self.polls.lock().unwrap();
            let next = if polls.len() > 1 {
                polls.pop_front()
            } else {
                polls.front().cloned()
            };
            next.ok_or_else(|| AppError::Internal("no scripted poll".to_string()))
        }

        async fn download(&self, locator: &str) -> AppResult<Bytes> {
            assert_eq!(locator, RESULT_URL);
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }
}
