use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::model::role::Role;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    http::header::{AUTHORIZATION, HeaderMap},
    web::Data,
};
use serde_json::json;

/// Resolves the bearer token into an [`AuthUser`], or the reason it was refused.
fn authenticate(headers: &HeaderMap, config: &Config) -> Result<AuthUser, String> {
    let header_value = headers
        .get(AUTHORIZATION)
        .ok_or("Missing Authorization header")?
        .to_str()
        .map_err(|_| "Invalid Authorization header encoding")?;

    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or("Authorization header must start with Bearer")?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|e| format!("Invalid or expired token: {e}"))?;

    let role = Role::from_id(claims.role).ok_or("Invalid role")?;

    // agency tokens scope every ownership check
    if role == Role::Agency && claims.agency_id.is_none() {
        return Err("Agency token without agency_id".to_string());
    }

    Ok(AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        role,
        agency_id: claims.agency_id,
    })
}

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    match authenticate(req.headers(), config) {
        Ok(auth_user) => {
            tracing::debug!(user_id = auth_user.user_id, role = %auth_user.role, "Authenticated request");
            req.extensions_mut().insert(auth_user);
            next.call(req).await
        }
        Err(reason) => {
            tracing::debug!(path = %req.path(), %reason, "Rejected unauthenticated request");
            let resp = HttpResponse::Unauthorized().json(json!({
                "error": "unauthorized",
                "message": reason,
                "retryable": false,
            }));
            Ok(req.into_response(resp.map_into_boxed_body()))
        }
    }
}
