use actix_web::{web, HttpRequest, HttpResponse, Responder};
use bcrypt::verify;

use super::jwt::{generate_access_token, get_access_token_expiry};
use super::middleware::validate_request_token;
use super::model::{LoginRequest, Role, TokenResponse, UserInfo};
use crate::db::AppState;

/// Checks `password` against a bcrypt hash off the worker thread. Malformed
/// hashes count as a mismatch.
pub(crate) async fn verify_password(password: String, hash: String) -> bool {
    match web::block(move || verify(&password, &hash)).await {
        Ok(Ok(valid)) => valid,
        Ok(Err(e)) => {
            log::warn!("Stored password hash is unusable: {}", e);
            false
        }
        Err(e) => {
            log::error!("Password check was cancelled: {}", e);
            false
        }
    }
}

/// Login endpoint
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> impl Responder {
    let user = match state.repo.find_user_by_username(&body.username).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return HttpResponse::Unauthorized().json(crate::ErrorResponse::new(
                "Unauthorized",
                "Username atau password salah",
            ));
        }
        Err(e) => {
            log::error!("Database error during login: {:?}", e);
            return HttpResponse::InternalServerError()
                .json(crate::ErrorResponse::internal_error("Login failed"));
        }
    };

    if !verify_password(body.password.clone(), user.password_hash.clone()).await {
        return HttpResponse::Unauthorized().json(crate::ErrorResponse::new(
            "Unauthorized",
            "Username atau password salah",
        ));
    }

    let Some(role) = Role::parse(&user.role) else {
        log::error!("User {} has unknown role {:?}", user.username, user.role);
        return HttpResponse::Forbidden()
            .json(crate::ErrorResponse::new("Forbidden", "Akun tidak memiliki akses"));
    };

    let access_token = match generate_access_token(
        &state.jwt,
        &user.id.to_string(),
        &user.username,
        role,
    ) {
        Ok(t) => t,
        Err(e) => {
            log::error!("Failed to generate access token: {:?}", e);
            return HttpResponse::InternalServerError().json(crate::ErrorResponse::internal_error(
                "Failed to generate token",
            ));
        }
    };

    log::info!("User {} logged in", user.username);
    HttpResponse::Ok().json(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: get_access_token_expiry(),
        user: UserInfo::from(user),
    })
}

/// Current user from the bearer token
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Authentication",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = UserInfo),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn me(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    let claims = match validate_request_token(&req) {
        Ok(c) => c,
        Err(e) => return e.error_response(),
    };

    match state.repo.find_user_by_username(&claims.username).await {
        Ok(Some(user)) => HttpResponse::Ok().json(UserInfo::from(user)),
        Ok(None) => HttpResponse::NotFound()
            .json(crate::ErrorResponse::not_found("User tidak ditemukan")),
        Err(e) => {
            log::error!("Failed to load user {}: {:?}", claims.username, e);
            HttpResponse::InternalServerError()
                .json(crate::ErrorResponse::internal_error("Failed to load user"))
        }
    }
}

/// Configure auth routes
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/login", web::post().to(login))
            .route("/me", web::get().to(me)),
    );
}
