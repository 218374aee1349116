use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde::Serialize;
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::AppState;
use crate::db::models::{Order, OrderItem};
use crate::db::queries;
use crate::domain::OrderStatus;
use crate::error::AppError;
use crate::handlers::{CallerId, require_role};
use crate::services::checkout::{CartItem, CheckoutService};
use crate::services::OrderService;
use crate::validation;

#[derive(Debug, Deserialize)]
pub struct CartItemRequest {
    pub product: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub stand: Uuid,
    pub items: Vec<CartItemRequest>,
    pub idempotency_key: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

async fn with_items(state: &AppState, order: Order) -> Result<OrderResponse, AppError> {
    let items = queries::list_order_items(&state.db, order.id).await?;
    Ok(OrderResponse { order, items })
}

pub async fn create_order(
    State(state): State<AppState>,
    caller: CallerId,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(key) = payload.idempotency_key.as_deref() {
        validation::validate_idempotency_key(key)?;
    }
    let items: Vec<CartItem> = payload
        .items
        .iter()
        .map(|item| CartItem {
            product_id: item.product,
            quantity: item.quantity,
            unit_price: item.unit_price.clone(),
        })
        .collect();

    let service = CheckoutService::new(state.db.clone(), state.config.platform_account_key.clone());
    let order = service
        .create_order_with_payment(
            caller.0,
            payload.stand,
            &items,
            payload.idempotency_key.as_deref(),
            payload.notes.as_deref().unwrap_or(""),
        )
        .await?;

    let response = with_items(&state, order).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_orders(
    State(state): State<AppState>,
    caller: CallerId,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let limit = pagination.limit.unwrap_or(20);
    let offset = pagination.offset.unwrap_or(0);

    let user = queries::get_user(&state.db, caller.0, false)
        .await?
        .ok_or_else(|| AppError::Unauthorized("unknown caller".to_string()))?;
    // Buyers see their own orders; admin roles see everything.
    let scope = if user.role == "USER" { Some(user.id) } else { None };

    let orders = queries::list_orders(&state.db, scope, limit, offset).await?;
    Ok(Json(orders))
}

pub async fn get_order(
    State(state): State<AppState>,
    caller: CallerId,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user = queries::get_user(&state.db, caller.0, false)
        .await?
        .ok_or_else(|| AppError::Unauthorized("unknown caller".to_string()))?;
    let order = queries::get_order(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {} not found", id)))?;
    if user.role == "USER" && order.user_id != user.id {
        return Err(AppError::NotFound(format!("Order {} not found", id)));
    }
    let response = with_items(&state, order).await?;
    Ok(Json(response))
}

/// Status change through the state machine. A COMPLETED -> CANCELLED
/// transition runs the compensating reversal and returns 400 when the
/// claw-back cannot be funded.
pub async fn update_order_status(
    State(state): State<AppState>,
    caller: CallerId,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&state, &caller, &["SUPERADMIN", "STAND_ADMIN"]).await?;

    let new_status = OrderStatus::parse(&payload.status)
        .ok_or_else(|| AppError::Validation(format!("Unknown order status: {}", payload.status)))?;

    let service = OrderService::new(state.db.clone(), state.config.platform_account_key.clone());
    let order = service.update_status(id, new_status).await?;
    let response = with_items(&state, order).await?;
    Ok(Json(response))
}
