//! # Replicate Adapter
//!
//! Client HTTP du service d'inférence distant : création de prédiction,
//! lecture de son statut, téléchargement du résultat et validation de jeton.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::infrastructure::error::{AppError, AppResult};

pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";
pub const DEFAULT_MODEL_VERSION: &str =
    "0a9c7c558af4c0f20667c1bd1260ce32a2879944a0b9e44e1398660c077b1550";

const CREATE_STEP: &str = "contacting the inference service";
const POLL_STEP: &str = "checking prediction status";
const DOWNLOAD_STEP: &str = "downloading converted audio";

/// Statut d'une prédiction côté service distant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl PredictionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PredictionStatus::Succeeded | PredictionStatus::Failed | PredictionStatus::Canceled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PredictionStatus::Starting => "starting",
            PredictionStatus::Processing => "processing",
            PredictionStatus::Succeeded => "succeeded",
            PredictionStatus::Failed => "failed",
            PredictionStatus::Canceled => "canceled",
        }
    }
}

/// Sortie d'une prédiction : une URL ou une liste d'URLs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionOutput {
    Single(String),
    Many(Vec<String>),
}

impl PredictionOutput {
    pub fn first_locator(&self) -> Option<&str> {
        let locator = match self {
            PredictionOutput::Single(url) => Some(url.as_str()),
            PredictionOutput::Many(urls) => urls.first().map(String::as_str),
        };
        locator.filter(|url| !url.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Option<PredictionOutput>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl Prediction {
    /// Raison d'échec fournie par le service, si présente
    pub fn failure_reason(&self) -> Option<String> {
        match &self.error {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(reason)) if reason.trim().is_empty() => None,
            Some(serde_json::Value::String(reason)) => Some(reason.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// Paramètres d'inférence fixes envoyés avec chaque conversion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceParameters {
    pub pitch_change: i32,
    pub index_rate: f64,
    pub filter_radius: u32,
    pub rms_mix_rate: f64,
    pub protect: f64,
}

impl Default for InferenceParameters {
    fn default() -> Self {
        Self {
            pitch_change: 0,
            index_rate: 0.5,
            filter_radius: 3,
            rms_mix_rate: 0.25,
            protect: 0.33,
        }
    }
}

#[derive(Serialize)]
struct CreatePredictionRequest<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
}

#[derive(Serialize)]
struct PredictionInput<'a> {
    song_input: &'a str,
    rvc_model: &'a str,
    #[serde(flatten)]
    parameters: &'a InferenceParameters,
}

/// Résultat de la validation d'un jeton
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TokenValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(message.into()),
        }
    }
}

/// Opérations du service d'inférence utilisées par le pipeline
#[async_trait]
pub trait PredictionApi: Send + Sync {
    async fn create_prediction(
        &self,
        token: &str,
        data_uri: &str,
        model_locator: &str,
        parameters: &InferenceParameters,
    ) -> AppResult<Prediction>;

    async fn get_prediction(&self, token: &str, id: &str) -> AppResult<Prediction>;

    async fn download(&self, locator: &str) -> AppResult<Bytes>;
}

/// Client REST Replicate
#[derive(Clone)]
pub struct ReplicateApi {
    http: HttpClient,
    base_url: String,
    model_version: String,
}

impl ReplicateApi {
    pub fn new(http: HttpClient, base_url: impl Into<String>, model_version: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model_version: model_version.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Vérifie un jeton avec une requête de liste minimale.
    ///
    /// Ne renvoie jamais d'erreur : tout échec devient un message.
    pub async fn validate_token(&self, token: &str) -> TokenValidation {
        let token = token.trim();
        if token.is_empty() {
            return TokenValidation::rejected("Token cannot be empty");
        }

        let response = self
            .http
            .get(format!("{}/predictions", self.base_url))
            .query(&[("page_size", "1")])
            .header("Authorization", format!("Token {}", token))
            .send()
            .await;

        match response {
            Err(_) => TokenValidation::rejected("Network error. Please check your connection."),
            Ok(response) => match response.status() {
                status if status.is_success() => TokenValidation::ok(),
                StatusCode::UNAUTHORIZED => TokenValidation::rejected(
                    "Invalid token. Please check your Replicate API token.",
                ),
                StatusCode::FORBIDDEN => {
                    TokenValidation::rejected("Token does not have required permissions.")
                }
                status => TokenValidation::rejected(format!(
                    "Validation failed (HTTP {})",
                    status.as_u16()
                )),
            },
        }
    }

    async fn read_prediction(response: reqwest::Response, step: &str) -> AppResult<Prediction> {
        let status = response.status();
        let body = response.text().await.map_err(|_| AppError::Network {
            operation: step.to_string(),
        })?;

        if !status.is_success() {
            return Err(AppError::RemoteHttp {
                operation: step.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| AppError::MalformedResponse(format!("Invalid prediction payload: {}", e)))
    }
}

#[async_trait]
impl PredictionApi for ReplicateApi {
    async fn create_prediction(
        &self,
        token: &str,
        data_uri: &str,
        model_locator: &str,
        parameters: &InferenceParameters,
    ) -> AppResult<Prediction> {
        let request = CreatePredictionRequest {
            version: &self.model_version,
            input: PredictionInput {
                song_input: data_uri,
                rvc_model: model_locator,
                parameters,
            },
        };

        let response = self
            .http
            .post(format!("{}/predictions", self.base_url))
            .header("Authorization", format!("Token {}", token))
            .json(&request)
            .send()
            .await
            .map_err(|_| AppError::Network {
                operation: CREATE_STEP.to_string(),
            })?;

        let prediction = Self::read_prediction(response, CREATE_STEP).await?;
        debug!(prediction_id = %prediction.id, status = prediction.status.as_str(), "Prédiction créée");
        Ok(prediction)
    }

    async fn get_prediction(&self, token: &str, id: &str) -> AppResult<Prediction> {
        let response = self
            .http
            .get(format!("{}/predictions/{}", self.base_url, id))
            .header("Authorization", format!("Token {}", token))
            .send()
            .await
            .map_err(|_| AppError::Network {
                operation: POLL_STEP.to_string(),
            })?;

        Self::read_prediction(response, POLL_STEP).await
    }

    async fn download(&self, locator: &str) -> AppResult<Bytes> {
        let response = self.http.get(locator).send().await.map_err(|_| AppError::Network {
            operation: DOWNLOAD_STEP.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(AppError::Download(format!(
                "Failed to download converted audio (HTTP {})",
                response.status().as_u16()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| AppError::Download(format!("Failed to read converted audio: {}", e)))
    }
}
