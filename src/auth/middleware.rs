use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header;
use actix_web::middleware::Next;
use actix_web::{web, Error, ResponseError};

use super::rate_limit::{client_key, endpoint_key, Admission};
use crate::error::{AppError, AuthError};
use crate::AppState;

/// Runs every request through the rate governor before routing.
pub async fn rate_limit(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let Some(state) = req.app_data::<web::Data<AppState>>().cloned() else {
        return next.call(req).await.map(ServiceResponse::map_into_left_body);
    };

    let limiter = &state.rate_limiter;
    let client = client_key(
        req.headers(),
        req.peer_addr(),
        limiter.config().trust_forwarded_for,
    );
    let endpoint = endpoint_key(req.method().as_str(), req.path());

    if limiter.admit(&client, &endpoint).await == Admission::Deny {
        let mut response = AppError::AuthError(AuthError::RateLimited).error_response();
        response.headers_mut().insert(
            header::RETRY_AFTER,
            header::HeaderValue::from(limiter.retry_after_secs()),
        );
        return Ok(req.into_response(response).map_into_right_body());
    }

    next.call(req).await.map(ServiceResponse::map_into_left_body)
}
