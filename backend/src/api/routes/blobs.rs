use actix_web::{get, web, HttpResponse};

use super::AppState;
use crate::infrastructure::error::{AppError, AppResult};

/// Sert un blob stocké ; la clé est l'empreinte SHA-256 du contenu
#[get("/blobs/{key}")]
pub async fn get_blob(path: web::Path<String>, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let key = path.into_inner();
    let data = state
        .blobs
        .get(&key)
        .await?
        .ok_or_else(|| AppError::NotFound("Blob".to_string()))?;

    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        // Contenu immuable : la clé change avec les octets
        .insert_header(("Cache-Control", "public, max-age=31536000, immutable"))
        .body(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::testing::context;
    use crate::core::conversion::inference::fakes::ScriptedApi;
    use crate::domain::BlobHandle;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_stored_blob_is_served() {
        let ctx = context(ScriptedApi::succeeding(), None).await;
        let stored = ctx
            .state
            .blobs
            .put(&BlobHandle::from_bytes(&b"converted"[..]))
            .await
            .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx.state.clone()))
                .service(get_blob),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/blobs/{}", stored.key))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "converted");

        let req = test::TestRequest::get()
            .uri(&format!("/blobs/{}", "0".repeat(64)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
