//! # Credential Routes
//!
//! Gestion du jeton API Replicate utilisé par les conversions. Le jeton
//! lui-même n'est jamais renvoyé : seuls sa présence et son origine le sont.

use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use super::AppState;
use crate::domain::CallerId;
use crate::infrastructure::error::AppResult;
use crate::services::credentials::TokenSource;

#[derive(Debug, Serialize)]
pub struct CredentialStatus {
    pub configured: bool,
    pub source: TokenSource,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SaveTokenRequest {
    #[validate(length(min = 1, message = "Token cannot be empty"))]
    pub token: String,
}

/// Jeton à valider ; à défaut, le jeton actuellement configuré
#[derive(Debug, Default, Deserialize)]
pub struct ValidateTokenRequest {
    pub token: Option<String>,
}

fn status(state: &AppState) -> CredentialStatus {
    CredentialStatus {
        configured: state.credentials.is_configured(),
        source: state.credentials.source(),
    }
}

#[get("/credentials")]
pub async fn get_credentials(_caller: CallerId, state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(status(&state))
}

#[put("/credentials")]
pub async fn save_credentials(
    caller: CallerId,
    request: web::Json<SaveTokenRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    request.validate()?;
    state.credentials.save(&request.token).await?;
    info!("🔑 Jeton Replicate enregistré par {}", caller);
    Ok(HttpResponse::Ok().json(status(&state)))
}

#[delete("/credentials")]
pub async fn clear_credentials(
    caller: CallerId,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    state.credentials.clear().await?;
    info!("🔑 Jeton Replicate supprimé par {}", caller);
    Ok(HttpResponse::Ok().json(status(&state)))
}

/// Vérifie un jeton auprès de Replicate sans l'enregistrer
#[post("/credentials/validate")]
pub async fn validate_credentials(
    _caller: CallerId,
    request: Option<web::Json<ValidateTokenRequest>>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let token = request
        .and_then(|body| body.into_inner().token)
        .unwrap_or_else(|| state.credentials.token());
    let validation = state.replicate.validate_token(&token).await;
    HttpResponse::Ok().json(validation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::middleware::CALLER_HEADER;
    use crate::api::routes::testing::{context, CALLER};
    use crate::core::conversion::inference::fakes::ScriptedApi;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use assert_json_diff::assert_json_include;
    use serde_json::json;

    #[actix_web::test]
    async fn test_save_and_clear_token() {
        let ctx = context(ScriptedApi::succeeding(), None).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx.state.clone()))
                .service(get_credentials)
                .service(save_credentials)
                .service(clear_credentials),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/credentials")
            .insert_header((CALLER_HEADER, CALLER))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_json_include!(actual: body, expected: json!({"configured": false, "source": "none"}));

        let req = test::TestRequest::put()
            .uri("/credentials")
            .insert_header((CALLER_HEADER, CALLER))
            .set_json(json!({"token": "  r8_saved  "}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_json_include!(actual: body, expected: json!({"configured": true, "source": "saved"}));
        assert_eq!(ctx.state.credentials.token(), "r8_saved");

        let req = test::TestRequest::delete()
            .uri("/credentials")
            .insert_header((CALLER_HEADER, CALLER))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_json_include!(actual: body, expected: json!({"configured": false}));
    }

    #[actix_web::test]
    async fn test_empty_token_is_rejected() {
        let ctx = context(ScriptedApi::succeeding(), None).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx.state.clone()))
                .service(save_credentials)
                .service(validate_credentials),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/credentials")
            .insert_header((CALLER_HEADER, CALLER))
            .set_json(json!({"token": ""}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        // Aucun jeton configuré : la validation échoue sans appel réseau
        let req = test::TestRequest::post()
            .uri("/credentials/validate")
            .insert_header((CALLER_HEADER, CALLER))
            .set_json(json!({}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({"valid": false, "error": "Token cannot be empty"}));
    }
}
