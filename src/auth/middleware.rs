use actix_web::error::{ErrorForbidden, ErrorInternalServerError, ErrorUnauthorized};
use actix_web::{web, Error, HttpRequest};

use super::jwt::{validate_token, JwtKeys};
use super::model::{Claims, Role};
use crate::db::AppState;

/// Extract token from Authorization header
fn extract_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

fn request_keys(req: &HttpRequest) -> Result<&JwtKeys, Error> {
    req.app_data::<web::Data<AppState>>()
        .map(|state| &state.jwt)
        .ok_or_else(|| {
            log::error!("AppState is not registered for {}", req.path());
            ErrorInternalServerError("Server misconfigured")
        })
}

/// Validate token from HttpRequest and return claims
pub fn validate_request_token(req: &HttpRequest) -> Result<Claims, Error> {
    validate_with_keys(request_keys(req)?, req)
}

/// Like [`validate_request_token`], additionally requiring one of `roles`.
pub fn require_role(req: &HttpRequest, roles: &[Role]) -> Result<Claims, Error> {
    let claims = validate_request_token(req)?;
    check_role(req, claims, roles)
}

pub(crate) fn validate_with_keys(keys: &JwtKeys, req: &HttpRequest) -> Result<Claims, Error> {
    let token =
        extract_token(req).ok_or_else(|| ErrorUnauthorized("Missing authorization token"))?;

    let claims = validate_token(keys, &token).map_err(|e| {
        log::warn!("Token validation failed: {:?}", e);
        ErrorUnauthorized("Invalid or expired token")
    })?;

    if claims.token_type != "access" {
        return Err(ErrorUnauthorized("Invalid token type"));
    }

    Ok(claims)
}

pub(crate) fn check_role(req: &HttpRequest, claims: Claims, roles: &[Role]) -> Result<Claims, Error> {
    if !roles.contains(&claims.role) {
        log::warn!(
            "User {} with role {} denied access to {}",
            claims.username,
            claims.role.as_str(),
            req.path()
        );
        return Err(ErrorForbidden("Insufficient role"));
    }
    Ok(claims)
}
