use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::models::TokenType;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use serde_json::json;

fn reject(req: ServiceRequest, message: &str) -> ServiceResponse<BoxBody> {
    let resp = HttpResponse::Unauthorized().json(json!({"error": "Unauthorized", "message": message}));
    req.into_response(resp.map_into_boxed_body())
}

/// Resolves the bearer access token into an `AuthUser` stored in the
/// request extensions.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?
        .clone();

    let token = match req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
    {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(t) => t.to_string(),
            None => return Ok(reject(req, "Authorization header must start with Bearer")),
        },
        None => return Ok(reject(req, "Missing Authorization header")),
    };

    let claims = match verify_token(&token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Access => c,
        Ok(_) => return Ok(reject(req, "Refresh tokens cannot access the API")),
        Err(e) => {
            tracing::debug!(error = %e, "Token rejected");
            return Ok(reject(req, "Invalid or expired token"));
        }
    };

    let Some(auth_user) = AuthUser::from_claims(claims) else {
        return Ok(reject(req, "Invalid role"));
    };

    req.extensions_mut().insert(auth_user);

    next.call(req).await
}
