//! # Lecture des formulaires multipart
//!
//! Les conversions et les uploads de modèles reçoivent un fichier audio
//! accompagné de champs texte. Le fichier est lu en mémoire avec une limite
//! de taille vérifiée à chaque chunk.

use actix_multipart::Multipart;
use bytes::{Bytes, BytesMut};
use futures_util::TryStreamExt;
use std::collections::HashMap;
use tracing::debug;

use crate::infrastructure::error::{AppError, AppResult};
use crate::utils::validation::{ensure_within_limit, guess_mime_type, validate_filename};

/// Taille maximale d'un champ texte
const MAX_TEXT_FIELD_BYTES: u64 = 64 * 1024;

/// Fichier audio reçu dans un formulaire
#[derive(Debug, Clone)]
pub struct UploadedAudio {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    audio: Option<UploadedAudio>,
}

impl UploadForm {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn require_text(&self, name: &str) -> AppResult<&str> {
        self.text(name)
            .ok_or_else(|| AppError::InvalidInput(format!("Missing field: {}", name)))
    }

    pub fn take_audio(&mut self) -> AppResult<UploadedAudio> {
        self.audio
            .take()
            .ok_or_else(|| AppError::InvalidInput("No audio file provided".to_string()))
    }
}

/// Lit un formulaire multipart : champs texte et au plus un fichier
pub async fn read_upload_form(mut payload: Multipart, limit: u64) -> AppResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        match file_name {
            Some(file_name) => {
                if form.audio.is_some() {
                    return Err(AppError::InvalidInput(
                        "Only one audio file can be uploaded".to_string(),
                    ));
                }
                validate_filename(&file_name)?;

                // Type déclaré s'il est audio, sinon déduit de l'extension
                let mime_type = field
                    .content_type()
                    .filter(|mime| mime.type_() == "audio")
                    .map(|mime| mime.essence_str().to_string())
                    .or_else(|| guess_mime_type(&file_name).map(str::to_string));

                let mut buffer = BytesMut::new();
                while let Some(chunk) = field.try_next().await? {
                    ensure_within_limit((buffer.len() + chunk.len()) as u64, limit)?;
                    buffer.extend_from_slice(&chunk);
                }

                debug!("📁 Fichier reçu: {} ({} bytes)", file_name, buffer.len());
                form.audio = Some(UploadedAudio {
                    file_name,
                    mime_type,
                    data: buffer.freeze(),
                });
            }
            None => {
                let mut buffer = Vec::new();
                while let Some(chunk) = field.try_next().await? {
                    if (buffer.len() + chunk.len()) as u64 > MAX_TEXT_FIELD_BYTES {
                        return Err(AppError::InvalidInput(format!(
                            "Field {} is too long",
                            name
                        )));
                    }
                    buffer.extend_from_slice(&chunk);
                }
                let value = String::from_utf8(buffer).map_err(|_| {
                    AppError::InvalidInput(format!("Field {} must be valid UTF-8", name))
                })?;
                form.fields.insert(name, value);
            }
        }
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::testing::{multipart_body, multipart_content_type};
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, web, App, HttpResponse};

    async fn echo(payload: Multipart) -> AppResult<HttpResponse> {
        let mut form = read_upload_form(payload, 16).await?;
        let audio = form.take_audio()?;
        Ok(HttpResponse::Ok().json(serde_json::json!({
            "name": form.require_text("name")?,
            "file_name": audio.file_name,
            "mime_type": audio.mime_type,
            "size": audio.data.len(),
        })))
    }

    #[actix_web::test]
    async fn test_reads_fields_and_file() {
        let app = test::init_service(App::new().route("/", web::post().to(echo))).await;

        let req = test::TestRequest::post()
            .uri("/")
            .insert_header((header::CONTENT_TYPE, multipart_content_type()))
            .set_payload(multipart_body(
                &[("name", " Tenor ")],
                Some(("audio", "take.mp3", &b"ID3-bytes"[..])),
            ))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["name"], "Tenor");
        assert_eq!(body["file_name"], "take.mp3");
        assert_eq!(body["mime_type"], "audio/mpeg");
        assert_eq!(body["size"], 9);
    }

    #[actix_web::test]
    async fn test_oversized_file_is_rejected() {
        let app = test::init_service(App::new().route("/", web::post().to(echo))).await;

        let req = test::TestRequest::post()
            .uri("/")
            .insert_header((header::CONTENT_TYPE, multipart_content_type()))
            .set_payload(multipart_body(
                &[("name", "Tenor")],
                Some(("audio", "take.wav", &[0u8; 64][..])),
            ))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[actix_web::test]
    async fn test_missing_file_is_bad_request() {
        let app = test::init_service(App::new().route("/", web::post().to(echo))).await;

        let req = test::TestRequest::post()
            .uri("/")
            .insert_header((header::CONTENT_TYPE, multipart_content_type()))
            .set_payload(multipart_body(&[("name", "Tenor")], None))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
