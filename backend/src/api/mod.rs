//! # API HTTP
//!
//! Surface REST du service : conversions, jobs, modèles de voix, jeton
//! du service d'inférence et lecture des blobs stockés.

pub mod routes;

use actix_web::{web, HttpResponse, Responder};

pub use routes::AppState;

/// Configure toutes les routes de l'API
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            // Conversions en cours
            .service(routes::conversions::start_conversion)
            .service(routes::conversions::list_conversions)
            .service(routes::conversions::get_conversion)
            .service(routes::conversions::cancel_conversion)
            // Jobs persistés (le flux avant le chemin paramétré)
            .service(routes::jobs::stream_jobs)
            .service(routes::jobs::list_jobs)
            .service(routes::jobs::get_job)
            .service(routes::jobs::download_result)
            // Modèles de voix
            .service(routes::models::list_models)
            .service(routes::models::upload_model)
            .service(routes::models::get_model)
            .service(routes::models::delete_model)
            // Jeton Replicate
            .service(routes::credentials::get_credentials)
            .service(routes::credentials::save_credentials)
            .service(routes::credentials::clear_credentials)
            .service(routes::credentials::validate_credentials),
    );

    // Blobs adressés par contenu (URLs produites par le stockage)
    cfg.service(routes::blobs::get_blob);

    // Endpoint de santé
    cfg.service(web::resource("/health").route(web::get().to(health_check)));
}

/// Endpoint de santé pour monitoring
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_health_check() {
        let app = test::init_service(
            App::new().service(web::resource("/health").route(web::get().to(health_check))),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
