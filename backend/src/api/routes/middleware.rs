//! # Identité de l'appelant
//!
//! Le service ne gère pas l'authentification : l'identité de l'appelant est
//! fournie par la passerelle en amont dans l'en-tête `X-Caller-Id`. Les
//! handlers la reçoivent via l'extracteur `CallerId`.

use actix_web::{dev::Payload, http::header::HeaderMap, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};

use crate::domain::CallerId;
use crate::infrastructure::error::{AppError, AppResult};

pub const CALLER_HEADER: &str = "X-Caller-Id";

const MAX_CALLER_ID_LEN: usize = 128;

/// Lit et valide l'identité de l'appelant
pub fn caller_from_headers(headers: &HeaderMap) -> AppResult<CallerId> {
    let value = headers
        .get(CALLER_HEADER)
        .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", CALLER_HEADER)))?
        .to_str()
        .map_err(|_| AppError::Unauthorized(format!("Invalid {} header", CALLER_HEADER)))?
        .trim();

    if value.is_empty() || value.len() > MAX_CALLER_ID_LEN {
        return Err(AppError::Unauthorized(format!(
            "Invalid {} header",
            CALLER_HEADER
        )));
    }

    Ok(CallerId::new(value))
}

impl FromRequest for CallerId {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(caller_from_headers(req.headers()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App, HttpResponse};

    async fn whoami(caller: CallerId) -> HttpResponse {
        HttpResponse::Ok().body(caller.to_string())
    }

    #[actix_web::test]
    async fn test_caller_header_is_extracted() {
        let app = test::init_service(App::new().route("/", web::get().to(whoami))).await;

        let req = test::TestRequest::get()
            .uri("/")
            .insert_header((CALLER_HEADER, "  alice "))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;

        assert_eq!(body, "alice");
    }

    #[actix_web::test]
    async fn test_missing_or_blank_caller_is_unauthorized() {
        let app = test::init_service(App::new().route("/", web::get().to(whoami))).await;

        let req = test::TestRequest::get().uri("/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/")
            .insert_header((CALLER_HEADER, "   "))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
