//! # Conversion Routes
//!
//! Soumission d'une conversion (audio d'entrée + modèle cible), suivi de sa
//! progression et annulation. La conversion elle-même tourne en tâche de
//! fond dans le `ConversionWorker` ; ces routes n'en exposent que l'état.

use actix_multipart::Multipart;
use actix_web::{delete, get, post, web, HttpResponse};
use tracing::info;
use uuid::Uuid;

use super::upload::read_upload_form;
use super::AppState;
use crate::domain::CallerId;
use crate::infrastructure::error::{AppError, AppResult};
use crate::workers::{ConversionRequest, RunId};

/// Démarre une conversion.
///
/// Formulaire multipart : `model_id` (texte) et le fichier audio d'entrée.
#[post("/conversions")]
pub async fn start_conversion(
    caller: CallerId,
    payload: Multipart,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    // 1. Lecture du formulaire
    let mut form = read_upload_form(payload, state.max_upload_bytes).await?;
    let model_id = Uuid::parse_str(form.require_text("model_id")?)
        .map_err(|_| AppError::InvalidInput("Invalid model_id".to_string()))?;
    let audio = form.take_audio()?;
    if audio.data.is_empty() {
        return Err(AppError::InvalidInput("Input audio is empty".to_string()));
    }

    // 2. Soumission au worker
    info!(
        "🎤 Conversion demandée par {} ({}, {} bytes)",
        caller,
        audio.file_name,
        audio.data.len()
    );
    let snapshot = state.worker.submit(ConversionRequest {
        caller,
        model_id,
        audio: audio.data,
        mime_type: audio.mime_type,
    });

    Ok(HttpResponse::Accepted().json(snapshot))
}

#[get("/conversions")]
pub async fn list_conversions(
    caller: CallerId,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.worker.runs_for(&caller)))
}

#[get("/conversions/{run_id}")]
pub async fn get_conversion(
    caller: CallerId,
    path: web::Path<RunId>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let snapshot = state.worker.snapshot(&caller, path.into_inner())?;
    Ok(HttpResponse::Ok().json(snapshot))
}

/// Annule une conversion en cours ; le job associé passe en échec
#[delete("/conversions/{run_id}")]
pub async fn cancel_conversion(
    caller: CallerId,
    path: web::Path<RunId>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let snapshot = state.worker.cancel(&caller, path.into_inner())?;
    Ok(HttpResponse::Accepted().json(snapshot))
}
