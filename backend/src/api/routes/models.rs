//! # Model Routes
//!
//! Gestion des modèles de voix de l'appelant : upload d'un audio de
//! référence avec ses métadonnées, liste, consultation et suppression.

use actix_multipart::Multipart;
use actix_web::{delete, get, post, web, HttpResponse};
use std::path::Path;
use tracing::info;

use super::upload::read_upload_form;
use super::AppState;
use crate::domain::{BlobHandle, CallerId, ModelId, ModelMetadata};
use crate::infrastructure::error::{AppError, AppResult};

#[get("/models")]
pub async fn list_models(caller: CallerId, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let models = state.store.list_models_for_caller(&caller).await?;
    Ok(HttpResponse::Ok().json(models))
}

/// Upload d'un modèle de voix.
///
/// Formulaire multipart : `name`, `description`, `format` et
/// `training_data` (optionnels sauf le nom) plus le fichier audio.
#[post("/models")]
pub async fn upload_model(
    caller: CallerId,
    payload: Multipart,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    // 1. Lecture et validation du formulaire
    let mut form = read_upload_form(payload, state.max_upload_bytes).await?;
    let audio = form.take_audio()?;
    if audio.data.is_empty() {
        return Err(AppError::InvalidInput("Model audio is empty".to_string()));
    }

    let format = match form.text("format") {
        Some(format) => format.to_string(),
        None => Path::new(&audio.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase(),
    };
    let metadata = ModelMetadata {
        name: form.require_text("name")?.to_string(),
        description: form.text("description").unwrap_or_default().to_string(),
        format,
        training_data: form.text("training_data").unwrap_or_default().to_string(),
    };

    // 2. Stockage de l'audio et création du modèle
    let model = state
        .store
        .upload_model(&caller, metadata, BlobHandle::from_bytes(audio.data))
        .await?;
    info!("🎙️  Modèle {} ({}) créé pour {}", model.id, model.metadata.name, caller);

    Ok(HttpResponse::Created().json(model))
}

#[get("/models/{model_id}")]
pub async fn get_model(
    caller: CallerId,
    path: web::Path<ModelId>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let model_id = path.into_inner();
    match state.store.get_model(model_id).await? {
        Some(model) if model.owner == caller => Ok(HttpResponse::Ok().json(model)),
        _ => Err(AppError::ModelNotFound(model_id)),
    }
}

#[delete("/models/{model_id}")]
pub async fn delete_model(
    caller: CallerId,
    path: web::Path<ModelId>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let model_id = path.into_inner();
    state.store.delete_model(&caller, model_id).await?;
    info!("🗑️  Modèle {} supprimé par {}", model_id, caller);
    Ok(HttpResponse::NoContent().finish())
}
