use actix_web::{web, HttpRequest, HttpResponse, Responder};

use crate::auth::{require_role, validate_request_token, Role};
use crate::db::{AppState, VillageUpdate};
use crate::letter::model::VillageInfo;

/// Get the village profile
#[utoipa::path(
    get,
    path = "/api/village",
    tag = "Village",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Village profile", body = VillageInfo),
        (status = 404, description = "Village profile not set", body = crate::ErrorResponse)
    )
)]
pub async fn get_village_info(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    if let Err(e) = validate_request_token(&req) {
        return e.error_response();
    }

    match state.repo.find_village_info().await {
        Ok(Some(info)) => HttpResponse::Ok().json(info),
        Ok(None) => HttpResponse::NotFound()
            .json(crate::ErrorResponse::not_found("Informasi desa belum diatur")),
        Err(e) => {
            log::error!("Error getting village info: {:?}", e);
            HttpResponse::InternalServerError()
                .json(crate::ErrorResponse::internal_error("Terjadi kesalahan pada server"))
        }
    }
}

/// Update the village profile (super admin only)
#[utoipa::path(
    put,
    path = "/api/village",
    tag = "Village",
    request_body = VillageUpdate,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Village profile updated", body = VillageInfo),
        (status = 400, description = "Missing required fields", body = crate::ErrorResponse),
        (status = 403, description = "Not a super admin")
    )
)]
pub async fn update_village_info(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<VillageUpdate>,
) -> impl Responder {
    if let Err(e) = require_role(&req, &[Role::SuperAdmin]) {
        return e.error_response();
    }

    let missing = body.missing_fields();
    if !missing.is_empty() {
        return HttpResponse::BadRequest().json(crate::ErrorResponse::bad_request(&format!(
            "Field berikut harus diisi: {}",
            missing.join(", ")
        )));
    }

    match state.repo.save_village_info(&body).await {
        Ok(info) => HttpResponse::Ok().json(info),
        Err(e) => {
            log::error!("Error updating village info: {:?}", e);
            HttpResponse::InternalServerError()
                .json(crate::ErrorResponse::internal_error("Terjadi kesalahan pada server"))
        }
    }
}

/// Configure village routes
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/village")
            .route(web::get().to(get_village_info))
            .route(web::put().to(update_village_info)),
    );
}
