//! # Job Routes
//!
//! Consultation des jobs de conversion persistés de l'appelant. Le flux
//! `/jobs/stream` relit la collection tant qu'un job est en cours et émet
//! chaque instantané sous forme de ligne JSON.

use actix_web::http::header::LOCATION;
use actix_web::{get, web, HttpResponse};
use bytes::Bytes;
use futures_util::StreamExt;
use uuid::Uuid;

use super::AppState;
use crate::domain::{CallerId, JobStatus};
use crate::infrastructure::error::{AppError, AppResult};

/// Liste des jobs avec le délai de rafraîchissement suggéré
#[get("/jobs")]
pub async fn list_jobs(caller: CallerId, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let listing = state.jobs.list_jobs(&caller).await?;
    Ok(HttpResponse::Ok().json(listing))
}

/// Flux NDJSON des instantanés jusqu'à ce que tous les jobs soient terminaux
#[get("/jobs/stream")]
pub async fn stream_jobs(caller: CallerId, state: web::Data<AppState>) -> HttpResponse {
    let snapshots = state.jobs.clone().watch_jobs(caller).map(|listing| {
        let listing = listing?;
        let mut line = serde_json::to_vec(&listing)?;
        line.push(b'\n');
        Ok::<_, AppError>(Bytes::from(line))
    });

    HttpResponse::Ok()
        .content_type("application/x-ndjson")
        .streaming(snapshots)
}

#[get("/jobs/{job_id}")]
pub async fn get_job(
    caller: CallerId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let job = state.jobs.get_job(&caller, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(job))
}

/// Redirige vers l'audio converti d'un job complété
#[get("/jobs/{job_id}/result")]
pub async fn download_result(
    caller: CallerId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let job = state.jobs.get_job(&caller, path.into_inner()).await?;

    let JobStatus::Completed { result, .. } = &job.status else {
        return Err(AppError::Conflict(format!(
            "Job is {}, no result available yet",
            job.status.label()
        )));
    };
    let url = result
        .direct_url()
        .ok_or_else(|| AppError::Internal(format!("Job {} result has no URL", job.id)))?;

    Ok(HttpResponse::SeeOther()
        .insert_header((LOCATION, url.to_string()))
        .finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::middleware::CALLER_HEADER;
    use crate::api::routes::testing::{context, CALLER};
    use crate::core::conversion::inference::fakes::ScriptedApi;
    use crate::domain::BlobHandle;
    use crate::infrastructure::database::DataStore;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_list_and_result_of_completed_job() {
        let ctx = context(ScriptedApi::succeeding(), Some("r8_test")).await;
        let caller = CallerId::new(CALLER);
        let job_id = ctx
            .store
            .create_job(&caller, ctx.model_id, BlobHandle::from_bytes(&b"input"[..]))
            .await
            .unwrap();
        ctx.store
            .complete_job(job_id, BlobHandle::from_url("https://blobs.example/out.wav"))
            .await
            .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx.state.clone()))
                .service(list_jobs)
                .service(download_result),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/jobs")
            .insert_header((CALLER_HEADER, CALLER))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["jobs"][0]["id"], job_id.to_string());
        assert_eq!(body["jobs"][0]["status"], "completed");
        assert_eq!(body["jobs"][0]["model_name"], "Soprano");
        assert!(body["refresh_after_ms"].is_null());

        let req = test::TestRequest::get()
            .uri(&format!("/jobs/{}/result", job_id))
            .insert_header((CALLER_HEADER, CALLER))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            resp.headers().get(LOCATION).unwrap(),
            "https://blobs.example/out.wav"
        );
    }

    #[actix_web::test]
    async fn test_in_flight_job_has_no_result() {
        let ctx = context(ScriptedApi::succeeding(), Some("r8_test")).await;
        let caller = CallerId::new(CALLER);
        let job_id = ctx
            .store
            .create_job(&caller, ctx.model_id, BlobHandle::from_bytes(&b"input"[..]))
            .await
            .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx.state.clone()))
                .service(list_jobs)
                .service(download_result),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/jobs")
            .insert_header((CALLER_HEADER, CALLER))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["refresh_after_ms"], 5000);

        let req = test::TestRequest::get()
            .uri(&format!("/jobs/{}/result", job_id))
            .insert_header((CALLER_HEADER, CALLER))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn test_other_callers_job_is_not_found() {
        let ctx = context(ScriptedApi::succeeding(), Some("r8_test")).await;
        let job_id = ctx
            .store
            .create_job(&CallerId::new(CALLER), ctx.model_id, BlobHandle::from_bytes(&b"input"[..]))
            .await
            .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx.state.clone()))
                .service(get_job),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/jobs/{}", job_id))
            .insert_header((CALLER_HEADER, "mallory"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_stream_ends_once_jobs_are_terminal() {
        let ctx = context(ScriptedApi::succeeding(), Some("r8_test")).await;
        let caller = CallerId::new(CALLER);
        let job_id = ctx
            .store
            .create_job(&caller, ctx.model_id, BlobHandle::from_bytes(&b"input"[..]))
            .await
            .unwrap();
        ctx.store.fail_job(job_id, "bad index").await.unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx.state.clone()))
                .service(stream_jobs),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/jobs/stream")
            .insert_header((CALLER_HEADER, CALLER))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        let lines: Vec<&[u8]> = body.split(|b| *b == b'\n').filter(|l| !l.is_empty()).collect();

        assert_eq!(lines.len(), 1);
        let listing: serde_json::Value = serde_json::from_slice(lines[0]).unwrap();
        assert_eq!(listing["jobs"][0]["status"], "failed");
        assert_eq!(listing["jobs"][0]["reason"], "bad index");
    }
}
