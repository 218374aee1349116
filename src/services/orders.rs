//! Order state machine. Status writes and their side effects (snapshot on
//! completion, compensating reversal on cancellation) run synchronously in
//! one transaction; there is no out-of-band observer.

use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::db::models::Order;
use crate::db::queries;
use crate::domain::OrderStatus;
use crate::error::AppError;
use crate::services::audit;

/// Mark an order COMPLETED and write its financial snapshot, inside the
/// caller's transaction. Used by checkout, which owns the settlement unit.
pub async fn complete_within(
    tx: &mut SqlxTransaction<'_, Postgres>,
    order_id: Uuid,
) -> Result<(), AppError> {
    queries::update_order_status(tx, order_id, OrderStatus::Completed.as_str()).await?;
    audit::record_completion(tx, order_id).await
}

#[derive(Clone)]
pub struct OrderService {
    pool: PgPool,
    platform_key: String,
}

impl OrderService {
    pub fn new(pool: PgPool, platform_key: String) -> Self {
        Self { pool, platform_key }
    }

    /// Transition an order to `new_status`, running the completion or
    /// reversal hook in the same transaction as the status write. A failed
    /// reversal rolls the whole transition back, leaving the order COMPLETED
    /// and un-reversed so the cancellation can be retried.
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<Order, AppError> {
        let mut tx = self.pool.begin().await?;
        let order = queries::lock_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;
        let current = OrderStatus::parse(&order.status).ok_or_else(|| {
            AppError::Internal(format!("order {} has unknown status {}", order_id, order.status))
        })?;

        if current == new_status {
            return Ok(order);
        }
        if !current.can_transition(new_status) {
            return Err(AppError::Validation(format!(
                "Cannot transition order from {} to {}",
                current, new_status
            )));
        }

        queries::update_order_status(&mut tx, order_id, new_status.as_str()).await?;
        match (current, new_status) {
            (_, OrderStatus::Completed) => {
                audit::record_completion(&mut tx, order_id).await?;
            }
            (OrderStatus::Completed, OrderStatus::Cancelled) => {
                audit::reverse_within(&mut tx, order_id, &self.platform_key).await?;
            }
            _ => {}
        }
        tx.commit().await?;

        tracing::info!(order_id = %order_id, from = %current, to = %new_status, "order transitioned");

        queries::get_order(&self.pool, order_id)
            .await?
            .ok_or_else(|| AppError::Internal("order vanished after transition".to_string()))
    }
}
