//! Bearer authentication followed by a role check, as one step.

use actix_web::http::header::{HeaderMap, AUTHORIZATION};
use tracing::debug;
use uuid::Uuid;

use super::token::{TokenCodec, TokenKind};
use crate::db::Role;
use crate::error::{AppError, AuthError};

/// The authenticated caller, handed explicitly to whatever runs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub subject: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthVerdict {
    Granted(AuthContext),
    Unauthenticated,
    Forbidden,
}

impl AuthVerdict {
    pub fn into_result(self) -> Result<AuthContext, AppError> {
        match self {
            AuthVerdict::Granted(ctx) => Ok(ctx),
            AuthVerdict::Unauthenticated => Err(AuthError::Unauthenticated.into()),
            AuthVerdict::Forbidden => Err(AuthError::Forbidden.into()),
        }
    }
}

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme == "Bearer" && !token.is_empty()).then_some(token)
}

pub fn authorize(codec: &TokenCodec, bearer: Option<&str>, allowed: &[Role]) -> AuthVerdict {
    let Some(bearer) = bearer else {
        return AuthVerdict::Unauthenticated;
    };

    match codec.verify_kind(bearer, TokenKind::Access) {
        Ok(token) if allowed.contains(&token.role) => AuthVerdict::Granted(AuthContext {
            subject: token.subject,
            role: token.role,
        }),
        Ok(token) => {
            debug!(principal = %token.subject, role = %token.role, "role not permitted");
            AuthVerdict::Forbidden
        }
        Err(e) => {
            debug!(error = %e, "access token rejected");
            AuthVerdict::Unauthenticated
        }
    }
}

pub fn authorize_request(
    codec: &TokenCodec,
    headers: &HeaderMap,
    allowed: &[Role],
) -> Result<AuthContext, AppError> {
    authorize(codec, bearer_token(headers), allowed).into_result()
}
