use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppError;
use crate::handlers::{CallerId, require_role};
use crate::services::LedgerService;
use crate::validation;

const TRANSACTION_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct AddFundsRequest {
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct TransactionsQuery {
    pub limit: Option<i64>,
}

/// Get-or-create the caller's wallet.
pub async fn me(
    State(state): State<AppState>,
    caller: CallerId,
) -> Result<impl IntoResponse, AppError> {
    let service = LedgerService::new(state.db.clone());
    let wallet = service.wallet_for_user(caller.0).await?;
    Ok(Json(wallet))
}

pub async fn transactions(
    State(state): State<AppState>,
    caller: CallerId,
    Query(query): Query<TransactionsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(TRANSACTION_PAGE_LIMIT).min(TRANSACTION_PAGE_LIMIT);
    let service = LedgerService::new(state.db.clone());
    let entries = service.transactions_for_user(caller.0, limit).await?;
    Ok(Json(entries))
}

/// Privileged credit-only mutation with no order tag.
pub async fn add_funds(
    State(state): State<AppState>,
    caller: CallerId,
    Json(payload): Json<AddFundsRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&state, &caller, &["EVENT_ADMIN", "SUPERADMIN"]).await?;
    validation::validate_positive_amount(&payload.amount)?;
    let description = payload.description.as_deref().unwrap_or("Admin credit");
    validation::validate_max_len("description", description, validation::DESCRIPTION_MAX_LEN)?;

    let service = LedgerService::new(state.db.clone());
    let wallet = service
        .add_funds(payload.user_id, &payload.amount, description)
        .await?;
    Ok(Json(wallet))
}
