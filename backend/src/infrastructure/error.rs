use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use std::time::Duration;
use uuid::Uuid;
use validator::ValidationErrors;

use crate::utils::error_message::{extract_rejection_reason, normalize_message};

/// Type de résultat standard pour l'application
pub type AppResult<T> = Result<T, AppError>;

/// Erreurs principales de l'application
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Jeton API absent ou vide (500)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Données fournies par l'appelant invalides (400)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Modèle de voix sans audio téléchargeable (422)
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Modèle de voix introuvable (404)
    #[error("Voice model {0} not found")]
    ModelNotFound(Uuid),

    /// Ressource introuvable (404)
    #[error("{0} not found")]
    NotFound(String),

    /// Échec de création du job persistant (502)
    #[error("Failed to create conversion job: {0}")]
    JobCreationFailed(String),

    /// Le service distant a signalé un échec ou une annulation (502)
    #[error("Voice conversion {status}: {}", reason.as_deref().unwrap_or("no reason given"))]
    RemoteConversionFailed {
        status: String,
        reason: Option<String>,
    },

    /// Budget de polling épuisé (504)
    #[error("Prediction still pending after {attempts} polls ({waited:?})")]
    Timeout { attempts: u32, waited: Duration },

    /// Téléchargement du résultat impossible (502)
    #[error("{0}")]
    Download(String),

    /// Échec de l'écriture de complétion (502)
    #[error("Failed to save conversion result: {0}")]
    ResultSaveFailed(String),

    /// Fichier au-delà de la limite autorisée (413)
    #[error("File of {size} bytes exceeds the {limit} bytes limit")]
    FileTooLarge { size: u64, limit: u64 },

    /// Échec de transport avant toute réponse HTTP (502)
    #[error("Network failure while {operation}")]
    Network { operation: String },

    /// Réponse HTTP non-2xx d'un service distant (502)
    #[error("HTTP {status} while {operation}: {body}")]
    RemoteHttp {
        operation: String,
        status: u16,
        body: String,
    },

    /// Réponse distante illisible ou incomplète (502)
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Rejet de la couche de persistance, enveloppe brute comprise (502)
    #[error("Backend rejection: {0}")]
    Backend(String),

    /// Transition d'état interdite (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Identité de l'appelant absente (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Exécution annulée par l'utilisateur (499-like, renvoyé en 409)
    #[error("Conversion canceled")]
    Canceled,

    /// Erreur interne (500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Forme d'erreur non reconnue (500)
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AppError {
    /// Convertit l'erreur en code HTTP approprié
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Configuration(_) | AppError::Internal(_) | AppError::Unknown(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidModel(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ModelNotFound(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Conflict(_) | AppError::Canceled => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::JobCreationFailed(_)
            | AppError::RemoteConversionFailed { .. }
            | AppError::Download(_)
            | AppError::ResultSaveFailed(_)
            | AppError::Network { .. }
            | AppError::RemoteHttp { .. }
            | AppError::MalformedResponse(_)
            | AppError::Backend(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message normalisé présentable à l'utilisateur.
    ///
    /// Ne panique jamais ; les enveloppes de rejet de la persistance sont
    /// réduites à leur raison la plus interne.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Configuration(msg)
            | AppError::InvalidInput(msg)
            | AppError::InvalidModel(msg)
            | AppError::Download(msg)
            | AppError::Unauthorized(msg) => msg.clone(),
            AppError::ModelNotFound(_) => "Voice model not found".to_string(),
            AppError::NotFound(resource) => format!("{} not found", resource),
            AppError::JobCreationFailed(reason) => {
                format!("Failed to create conversion job: {}", reason)
            }
            AppError::RemoteConversionFailed { status, reason } => match reason {
                Some(reason) if !reason.trim().is_empty() => reason.clone(),
                _ => format!("Voice conversion {}", status),
            },
            AppError::Timeout { waited, .. } => format!(
                "Voice conversion timed out after {}",
                describe_duration(*waited)
            ),
            AppError::ResultSaveFailed(reason) => {
                format!("Failed to save conversion result: {}", reason)
            }
            AppError::FileTooLarge { limit, .. } => format!(
                "File is too large. Maximum size is {} MB",
                limit / (1024 * 1024)
            ),
            AppError::Network { operation } => format!(
                "Network request failed while {}. Check your connection and verify the Replicate API token is configured correctly.",
                operation
            ),
            AppError::RemoteHttp {
                operation, status, ..
            } => format!("Failed {} (HTTP {})", operation, status),
            AppError::MalformedResponse(msg) => msg.clone(),
            AppError::Backend(envelope) => extract_rejection_reason(envelope)
                .unwrap_or_else(|| normalize_message(envelope)),
            AppError::Conflict(msg) => msg.clone(),
            AppError::Canceled => "Conversion canceled".to_string(),
            AppError::Internal(_) => "An internal error occurred".to_string(),
            AppError::Unknown(msg) => normalize_message(msg),
        }
    }

    /// Nom stable de la catégorie (utilisé dans les logs et les snapshots)
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "configuration",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::InvalidModel(_) => "invalid_model",
            AppError::ModelNotFound(_) => "model_not_found",
            AppError::NotFound(_) => "not_found",
            AppError::JobCreationFailed(_) => "job_creation_failed",
            AppError::RemoteConversionFailed { .. } => "remote_conversion_failed",
            AppError::Timeout { .. } => "timeout",
            AppError::Download(_) => "download",
            AppError::ResultSaveFailed(_) => "result_save_failed",
            AppError::FileTooLarge { .. } => "file_too_large",
            AppError::Network { .. } => "network",
            AppError::RemoteHttp { .. } => "remote_http",
            AppError::MalformedResponse(_) => "malformed_response",
            AppError::Backend(_) => "backend",
            AppError::Conflict(_) => "conflict",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Canceled => "canceled",
            AppError::Internal(_) => "internal",
            AppError::Unknown(_) => "unknown",
        }
    }
}

fn describe_duration(waited: Duration) -> String {
    let secs = waited.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        let minutes = secs / 60;
        format!("{} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        format!("{} seconds", secs)
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse {
            error: self.user_message(),
            code: self.status_code().as_u16(),
        };

        HttpResponse::build(self.status_code()).json(error_response)
    }
}

/// Structure de réponse d'erreur standardisée
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

// Implémentations From pour les conversions automatiques

impl From<SqlxError> for AppError {
    fn from(error: SqlxError) -> Self {
        match &error {
            SqlxError::RowNotFound => AppError::NotFound("Resource".to_string()),
            _ => AppError::Backend(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::MalformedResponse(error.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages = Vec::new();
        for (field, field_errors) in errors.field_errors() {
            for error in field_errors {
                match error.message.as_ref() {
                    Some(msg) => messages.push(msg.to_string()),
                    None => messages.push(format!("{} is invalid", field)),
                }
            }
        }
        AppError::InvalidInput(messages.join("; "))
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", error))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(error: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Task join error: {}", error))
    }
}

impl From<actix_multipart::MultipartError> for AppError {
    fn from(error: actix_multipart::MultipartError) -> Self {
        AppError::InvalidInput(format!("Invalid multipart payload: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            AppError::MalformedResponse(error.to_string())
        } else if let Some(status) = error.status() {
            AppError::RemoteHttp {
                operation: "calling a remote service".to_string(),
                status: status.as_u16(),
                body: error.to_string(),
            }
        } else {
            AppError::Network {
                operation: "calling a remote service".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_failure_reason_is_the_whole_message() {
        let err = AppError::RemoteConversionFailed {
            status: "failed".to_string(),
            reason: Some("bad index".to_string()),
        };
        assert_eq!(err.user_message(), "bad index");

        let err = AppError::RemoteConversionFailed {
            status: "canceled".to_string(),
            reason: None,
        };
        assert_eq!(err.user_message(), "Voice conversion canceled");
    }

    #[test]
    fn test_network_and_http_failures_are_distinguishable() {
        let network = AppError::Network {
            operation: "contacting the inference service".to_string(),
        };
        let http = AppError::RemoteHttp {
            operation: "contacting the inference service".to_string(),
            status: 422,
            body: "{}".to_string(),
        };

        assert!(network
            .user_message()
            .starts_with("Network request failed while contacting the inference service."));
        assert_eq!(
            http.user_message(),
            "Failed contacting the inference service (HTTP 422)"
        );
    }

    #[test]
    fn test_timeout_message_and_status() {
        let err = AppError::Timeout {
            attempts: 60,
            waited: Duration::from_secs(120),
        };
        assert_eq!(
            err.user_message(),
            "Voice conversion timed out after 2 minutes"
        );
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.kind(), "timeout");
    }

    #[test]
    fn test_backend_envelope_is_reduced() {
        let err = AppError::Backend(
            "Call failed:\n  \"Rejected\": Canister trapped: Model is private\n  Method: getModel"
                .to_string(),
        );
        assert_eq!(err.user_message(), "Model is private");
    }

    #[test]
    fn test_file_too_large_maps_to_413() {
        let err = AppError::FileTooLarge {
            size: 200 * 1024 * 1024,
            limit: 100 * 1024 * 1024,
        };
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.user_message(), "File is too large. Maximum size is 100 MB");
    }
}
