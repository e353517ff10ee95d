use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tracing::{info, warn};

use super::guard::bearer_token;
use super::token::TokenKind;
use crate::error::{AppError, AuthError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identity: String,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
pub struct RenewalRequest {
    pub renewal_token: String,
}

fn require_non_empty(value: &str, message: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::ValidationError(message.to_string()));
    }
    Ok(())
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    require_non_empty(&req.identity, "identity and secret required")?;
    require_non_empty(&req.secret, "identity and secret required")?;

    match state.auth_service.login(&req.identity, &req.secret).await {
        Ok(session) => Ok(HttpResponse::Ok().json(session)),
        Err(e) => {
            // The identity is logged server-side only; the caller sees a
            // single generic outcome.
            warn!(identity = %req.identity, error = %e, "login failed");
            Err(e)
        }
    }
}

pub async fn refresh(
    req: web::Json<RenewalRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    require_non_empty(&req.renewal_token, "renewal_token required")?;

    let renewed = state.auth_service.renew(&req.renewal_token).await?;
    Ok(HttpResponse::Ok().json(renewed))
}

/// The access token is checked before the body so that an unauthenticated
/// caller always gets 401.
pub async fn logout(
    req: HttpRequest,
    body: Result<web::Json<RenewalRequest>, actix_web::Error>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let access = bearer_token(req.headers()).ok_or(AuthError::Unauthenticated)?;
    state
        .auth_service
        .codec()
        .verify_kind(access, TokenKind::Access)
        .map_err(|_| AuthError::Unauthenticated)?;

    let body = body.map_err(|_| AppError::ValidationError("invalid request body".into()))?;
    require_non_empty(&body.renewal_token, "renewal_token required")?;

    state.auth_service.revoke(access, &body.renewal_token).await?;
    info!("logout completed");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "renewal token revoked successfully"
    })))
}
