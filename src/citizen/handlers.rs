use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::auth::validate_request_token;
use crate::dashboard::model::{CitizenWarning, WarningSearch};
use crate::db::AppState;
use crate::letter::model::{Citizen, Page, PageRequest};

const MIN_SEARCH_LEN: usize = 2;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CitizenSearch {
    /// Part of a name or NIK.
    pub q: Option<String>,
}

/// Search citizens by name or NIK
#[utoipa::path(
    get,
    path = "/api/citizens/search",
    tag = "Citizens",
    params(CitizenSearch),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Matching citizens", body = Vec<Citizen>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn search_citizens(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<CitizenSearch>,
) -> impl Responder {
    if let Err(e) = validate_request_token(&req) {
        return e.error_response();
    }

    let term = query.q.as_deref().map(str::trim).unwrap_or("");
    if term.chars().count() < MIN_SEARCH_LEN {
        return HttpResponse::Ok().json(Vec::<Citizen>::new());
    }

    match state.repo.search_citizens(term).await {
        Ok(citizens) => HttpResponse::Ok().json(citizens),
        Err(e) => {
            log::error!("Error in search_citizens: {:?}", e);
            HttpResponse::InternalServerError()
                .json(crate::ErrorResponse::internal_error("Terjadi kesalahan pada server"))
        }
    }
}

/// Citizens whose records have missing or malformed fields
#[utoipa::path(
    get,
    path = "/api/citizens/warnings",
    tag = "Citizens",
    params(WarningSearch, PageRequest),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Citizens with warnings", body = Page<CitizenWarning>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_warnings(
    req: HttpRequest,
    state: web::Data<AppState>,
    search: web::Query<WarningSearch>,
    page: web::Query<PageRequest>,
) -> impl Responder {
    if let Err(e) = validate_request_token(&req) {
        return e.error_response();
    }

    match state.repo.citizen_warnings(&search, page.into_inner()).await {
        Ok(page) => HttpResponse::Ok().json(page),
        Err(e) => {
            log::error!("Error in get_warnings: {:?}", e);
            HttpResponse::InternalServerError()
                .json(crate::ErrorResponse::internal_error("Terjadi kesalahan pada server"))
        }
    }
}

/// Get one citizen
#[utoipa::path(
    get,
    path = "/api/citizens/{id}",
    tag = "Citizens",
    params(("id" = Uuid, Path, description = "Citizen ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Citizen", body = Citizen),
        (status = 404, description = "Citizen not found", body = crate::ErrorResponse)
    )
)]
pub async fn get_citizen(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> impl Responder {
    if let Err(e) = validate_request_token(&req) {
        return e.error_response();
    }

    match state.repo.find_citizen(path.into_inner()).await {
        Ok(Some(citizen)) => HttpResponse::Ok().json(citizen),
        Ok(None) => HttpResponse::NotFound()
            .json(crate::ErrorResponse::not_found("Data penduduk tidak ditemukan")),
        Err(e) => {
            log::error!("Error getting citizen: {:?}", e);
            HttpResponse::InternalServerError()
                .json(crate::ErrorResponse::internal_error("Terjadi kesalahan pada server"))
        }
    }
}

/// Configure citizen routes
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/citizens")
            .route("/search", web::get().to(search_citizens))
            .route("/warnings", web::get().to(get_warnings))
            .route("/{id}", web::get().to(get_citizen)),
    );
}
