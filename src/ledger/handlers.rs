use actix_web::{web, HttpRequest, HttpResponse};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;

use crate::auth::{authorize_request, AuthContext};
use crate::db::{NewLedgerEntry, Role};
use crate::error::{AppError, DatabaseError};
use crate::AppState;

const WRITERS: &[Role] = &[Role::Admin];
const READERS: &[Role] = &[Role::Admin, Role::Viewer];

// Matches the NUMERIC(18, 2) column.
const MAX_SCALE: u32 = 2;
const AMOUNT_LIMIT: i64 = 10_000_000_000_000_000;

fn validate(entry: &NewLedgerEntry) -> Result<(), AppError> {
    if entry.amount <= Decimal::ZERO {
        return Err(AppError::ValidationError("amount must be positive".into()));
    }
    if entry.amount.normalize().scale() > MAX_SCALE {
        return Err(AppError::ValidationError(
            "amount must have at most 2 decimal places".into(),
        ));
    }
    if entry.amount >= Decimal::from(AMOUNT_LIMIT) {
        return Err(AppError::ValidationError("amount is too large".into()));
    }
    if entry.description.trim().is_empty() {
        return Err(AppError::ValidationError("description is required".into()));
    }
    Ok(())
}

async fn insert_entry(
    state: &AppState,
    caller: AuthContext,
    entry: &NewLedgerEntry,
) -> Result<HttpResponse, AppError> {
    validate(entry)?;
    let created = state
        .stores
        .ledger
        .create(entry, &caller.subject.to_string())
        .await?;
    info!(id = created.id, actor = %caller.subject, "ledger entry created");

    Ok(HttpResponse::Created().json(json!({
        "status": "created",
        "id": created.id,
    })))
}

/// The role check runs before the body is looked at, so a viewer gets 403
/// regardless of what it sent.
pub async fn create_entry(
    req: HttpRequest,
    body: Result<web::Json<NewLedgerEntry>, actix_web::Error>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let caller = authorize_request(&state.codec, req.headers(), WRITERS)?;
    let body = body.map_err(|_| AppError::ValidationError("invalid request body".into()))?;
    insert_entry(&state, caller, &body).await
}

pub async fn list_entries(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    authorize_request(&state.codec, req.headers(), READERS)?;
    let entries = state.stores.ledger.list().await?;
    Ok(HttpResponse::Ok().json(entries))
}

pub async fn get_entry(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    authorize_request(&state.codec, req.headers(), READERS)?;
    let id: i64 = path
        .parse()
        .map_err(|_| AppError::ValidationError("invalid ledger id".into()))?;

    let entry = state
        .stores
        .ledger
        .get(id)
        .await?
        .ok_or(AppError::DatabaseError(DatabaseError::NotFound))?;
    Ok(HttpResponse::Ok().json(entry))
}
