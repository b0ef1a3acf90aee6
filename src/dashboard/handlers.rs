use actix_web::{web, HttpRequest, HttpResponse, Responder};

use super::model::{AgeBracket, BreakdownTable, DashboardSummary};
use super::Breakdown;
use crate::auth::validate_request_token;
use crate::db::AppState;

fn server_error(context: &str, e: sqlx::Error) -> HttpResponse {
    log::error!("Error getting {}: {:?}", context, e);
    HttpResponse::InternalServerError()
        .json(crate::ErrorResponse::internal_error("Terjadi kesalahan pada server"))
}

/// Headline counts for the dashboard
#[utoipa::path(
    get,
    path = "/api/dashboard/stats",
    tag = "Dashboard",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Dashboard counts", body = DashboardSummary),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_dashboard_stats(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    if let Err(e) = validate_request_token(&req) {
        return e.error_response();
    }

    match state.repo.dashboard_summary().await {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => server_error("dashboard stats", e),
    }
}

/// Citizens per age bracket
#[utoipa::path(
    get,
    path = "/api/dashboard/age",
    tag = "Dashboard",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Age distribution", body = Vec<AgeBracket>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_age_stats(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    if let Err(e) = validate_request_token(&req) {
        return e.error_response();
    }

    match state.repo.age_distribution().await {
        Ok(brackets) => HttpResponse::Ok().json(brackets),
        Err(e) => server_error("age stats", e),
    }
}

async fn breakdown_response(
    req: HttpRequest,
    state: web::Data<AppState>,
    breakdown: Breakdown,
) -> HttpResponse {
    if let Err(e) = validate_request_token(&req) {
        return e.error_response();
    }

    match state.repo.breakdown(breakdown).await {
        Ok(table) => HttpResponse::Ok().json(table),
        Err(e) => server_error(&format!("{:?} breakdown", breakdown), e),
    }
}

/// Age groups per dusun, split by gender
#[utoipa::path(
    get,
    path = "/api/dashboard/dusun",
    tag = "Dashboard",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Age groups per dusun", body = BreakdownTable),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_dusun_stats(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    breakdown_response(req, state, Breakdown::Age).await
}

/// Marital status per dusun, split by gender
#[utoipa::path(
    get,
    path = "/api/dashboard/marriage",
    tag = "Dashboard",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Marital status per dusun", body = BreakdownTable),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_marriage_stats(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    breakdown_response(req, state, Breakdown::Marriage).await
}

/// Education level per dusun, split by gender
#[utoipa::path(
    get,
    path = "/api/dashboard/education",
    tag = "Dashboard",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Education level per dusun", body = BreakdownTable),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_education_stats(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    breakdown_response(req, state, Breakdown::Education).await
}

/// Configure dashboard routes
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/dashboard")
            .route("/stats", web::get().to(get_dashboard_stats))
            .route("/age", web::get().to(get_age_stats))
            .route("/dusun", web::get().to(get_dusun_stats))
            .route("/marriage", web::get().to(get_marriage_stats))
            .route("/education", web::get().to(get_education_stats)),
    );
}
