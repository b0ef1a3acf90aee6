use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::model::{HistoryEntry, HistoryFilter, LetterStats, Page, PageRequest};
use super::service::{run_detached, GeneratedLetter};
use super::LetterError;
use crate::auth::{require_role, Role};
use crate::db::AppState;

const STAFF: &[Role] = &[Role::Admin, Role::SuperAdmin];
/// Seconds a client should wait before retrying a failed conversion.
const RETRY_AFTER_SECS: u32 = 10;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LetterRequest {
    pub template_id: Uuid,
    pub citizen_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PreviewResponse {
    /// `data:application/pdf;base64,...`
    pub content: String,
}

fn error_response(err: &LetterError, expose_details: bool) -> HttpResponse {
    if err.status_code().is_server_error() {
        log::error!("Letter request failed: {}", err);
    } else {
        log::warn!("Letter request rejected: {}", err);
    }
    let mut response = HttpResponse::build(err.status_code());
    if err.is_retryable() {
        response.insert_header((header::RETRY_AFTER, RETRY_AFTER_SECS.to_string()));
    }
    response.json(err.to_response(expose_details))
}

fn pdf_response(letter: GeneratedLetter, disposition: &str) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("{}; filename=\"{}\"", disposition, letter.filename),
        ))
        .body(letter.pdf)
}

/// Generate a letter PDF and record it in the history
#[utoipa::path(
    post,
    path = "/api/letters/generate",
    tag = "Letters",
    request_body = LetterRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Generated PDF", content_type = "application/pdf"),
        (status = 400, description = "Template has no file", body = crate::ErrorResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Template, citizen or village info not found", body = crate::ErrorResponse),
        (status = 500, description = "Rendering or conversion failed", body = crate::ErrorResponse)
    )
)]
pub async fn generate_letter(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<LetterRequest>,
) -> impl Responder {
    let claims = match require_role(&req, STAFF) {
        Ok(c) => c,
        Err(e) => return e.error_response(),
    };
    let Some(user_id) = claims.user_id() else {
        return HttpResponse::Unauthorized().json(crate::ErrorResponse::new(
            "Unauthorized",
            "Token does not identify a user",
        ));
    };

    let LetterRequest {
        template_id,
        citizen_id,
    } = body.into_inner();
    let letters = state.letters.clone();
    let result = run_detached(state.letter_timeout, move |cancel| async move {
        letters
            .generate(template_id, citizen_id, user_id, &cancel)
            .await
    })
    .await;

    match result {
        Ok(letter) => pdf_response(letter, "inline"),
        Err(e) => error_response(&e, state.expose_error_details),
    }
}

/// Render a letter for on-screen preview without recording it
#[utoipa::path(
    post,
    path = "/api/letters/preview",
    tag = "Letters",
    request_body = LetterRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "PDF as data URI", body = PreviewResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Template, citizen or village info not found", body = crate::ErrorResponse),
        (status = 500, description = "Rendering or conversion failed", body = crate::ErrorResponse)
    )
)]
pub async fn preview_letter(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<LetterRequest>,
) -> impl Responder {
    if let Err(e) = require_role(&req, STAFF) {
        return e.error_response();
    }

    let LetterRequest {
        template_id,
        citizen_id,
    } = body.into_inner();
    let letters = state.letters.clone();
    let result = run_detached(state.letter_timeout, move |cancel| async move {
        letters.preview(template_id, citizen_id, &cancel).await
    })
    .await;

    match result {
        Ok(letter) => HttpResponse::Ok().json(PreviewResponse {
            content: letter.data_uri(),
        }),
        Err(e) => error_response(&e, state.expose_error_details),
    }
}

/// Paginated history of printed letters
#[utoipa::path(
    get,
    path = "/api/letters/history",
    tag = "Letters",
    params(HistoryFilter, PageRequest),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "History page", body = Page<HistoryEntry>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_history(
    req: HttpRequest,
    state: web::Data<AppState>,
    filter: web::Query<HistoryFilter>,
    page: web::Query<PageRequest>,
) -> impl Responder {
    if let Err(e) = require_role(&req, STAFF) {
        return e.error_response();
    }

    match state
        .letters
        .history()
        .query(&filter, page.into_inner())
        .await
    {
        Ok(page) => HttpResponse::Ok().json(page),
        Err(e) => error_response(&e, state.expose_error_details),
    }
}

/// Letter counts per template and per month
#[utoipa::path(
    get,
    path = "/api/letters/stats",
    tag = "Letters",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Letter statistics", body = LetterStats),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_stats(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    if let Err(e) = require_role(&req, STAFF) {
        return e.error_response();
    }

    match state.letters.history().stats().await {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => error_response(&e, state.expose_error_details),
    }
}

/// One history entry
#[utoipa::path(
    get,
    path = "/api/letters/{id}",
    tag = "Letters",
    params(("id" = Uuid, Path, description = "History entry ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "History entry", body = HistoryEntry),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Letter not found", body = crate::ErrorResponse)
    )
)]
pub async fn get_letter(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> impl Responder {
    if let Err(e) = require_role(&req, STAFF) {
        return e.error_response();
    }

    match state.letters.history().get(path.into_inner()).await {
        Ok(Some(entry)) => HttpResponse::Ok().json(entry),
        Ok(None) => {
            HttpResponse::NotFound().json(crate::ErrorResponse::not_found("Surat tidak ditemukan"))
        }
        Err(e) => error_response(&e, state.expose_error_details),
    }
}

/// Re-create a printed letter as a PDF download
#[utoipa::path(
    get,
    path = "/api/letters/{id}/download",
    tag = "Letters",
    params(("id" = Uuid, Path, description = "History entry ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Generated PDF", content_type = "application/pdf"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Letter not found", body = crate::ErrorResponse)
    )
)]
pub async fn download_letter(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> impl Responder {
    if let Err(e) = require_role(&req, STAFF) {
        return e.error_response();
    }

    let history_id = path.into_inner();
    let letters = state.letters.clone();
    let result = run_detached(state.letter_timeout, move |cancel| async move {
        letters.reprint(history_id, &cancel).await
    })
    .await;

    match result {
        Ok(letter) => pdf_response(letter, "attachment"),
        Err(e) => error_response(&e, state.expose_error_details),
    }
}

/// Configure letter routes
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/letters")
            .route("/generate", web::post().to(generate_letter))
            .route("/preview", web::post().to(preview_letter))
            .route("/history", web::get().to(get_history))
            .route("/stats", web::get().to(get_stats))
            .route("/{id}", web::get().to(get_letter))
            .route("/{id}/download", web::get().to(download_letter)),
    );
}
