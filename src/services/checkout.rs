//! Idempotent, concurrency-safe checkout: create an order and settle payment
//! between buyer, stand owner, and platform in one atomic transaction.
//!
//! The idempotency contract rests on the unique constraint over
//! `orders.idempotency_key`: a retry with a key that already landed returns
//! the original order, and a lost insert race is absorbed by re-fetching the
//! winner instead of surfacing an error.

use sqlx::PgPool;
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::db::models::{Order, OrderItem, StandContext};
use crate::db::queries;
use crate::domain::money;
use crate::domain::OrderStatus;
use crate::error::{is_unique_violation, AppError};
use crate::services::{ledger, orders};

const IDEMPOTENCY_KEY_CONSTRAINT: &str = "orders_idempotency_key_key";

#[derive(Debug, Clone)]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
}

enum Outcome {
    Settled(Order),
    AlreadyExists(Order),
    KeyConflict(String),
}

#[derive(Clone)]
pub struct CheckoutService {
    pool: PgPool,
    platform_key: String,
}

impl CheckoutService {
    pub fn new(pool: PgPool, platform_key: String) -> Self {
        Self { pool, platform_key }
    }

    /// Create an order and process payment atomically. Idempotent when
    /// `idempotency_key` is provided.
    pub async fn create_order_with_payment(
        &self,
        buyer_id: Uuid,
        stand_id: Uuid,
        items: &[CartItem],
        idempotency_key: Option<&str>,
        notes: &str,
    ) -> Result<Order, AppError> {
        let buyer = queries::get_user(&self.pool, buyer_id, false)
            .await?
            .ok_or_else(|| AppError::NotFound("Buyer not found".to_string()))?;
        if buyer.role != "USER" {
            return Err(AppError::Validation(
                "Only USER role can create paid orders via checkout.".to_string(),
            ));
        }
        if !buyer.is_active {
            return Err(AppError::Validation("Buyer account is not active.".to_string()));
        }

        let stand = queries::get_stand_context(&self.pool, stand_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Stand not found".to_string()))?;
        let commission_rate = stand.commission_rate.clone().unwrap_or_else(money::zero);

        let (resolved, total_amount) = self.resolve_items(stand_id, items).await?;

        match self
            .settle(buyer_id, &stand, &resolved, &total_amount, &commission_rate, idempotency_key, notes)
            .await?
        {
            Outcome::Settled(order) | Outcome::AlreadyExists(order) => Ok(order),
            Outcome::KeyConflict(key) => {
                // Another caller won the insert race; their order is the order.
                queries::find_order_by_idempotency_key(&self.pool, &key)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal("idempotency conflict but no order found".to_string())
                    })
            }
        }
    }

    /// Validate cart items against the stand and compute the rounded total.
    /// Rows with quantity <= 0 are dropped; a negative unit price is an error.
    async fn resolve_items(
        &self,
        stand_id: Uuid,
        items: &[CartItem],
    ) -> Result<(Vec<CartItem>, BigDecimal), AppError> {
        let mut resolved = Vec::new();
        let mut total = money::zero();
        for item in items {
            let product = queries::get_product_in_stand(&self.pool, item.product_id, stand_id)
                .await?
                .ok_or_else(|| {
                    AppError::Validation(format!(
                        "Product {} not found or does not belong to this stand.",
                        item.product_id
                    ))
                })?;
            if item.quantity <= 0 {
                continue;
            }
            if item.unit_price < money::zero() {
                return Err(AppError::Validation("Unit price cannot be negative.".to_string()));
            }
            total += &item.unit_price * BigDecimal::from(item.quantity);
            resolved.push(CartItem {
                product_id: product.id,
                quantity: item.quantity,
                unit_price: item.unit_price.clone(),
            });
        }

        let total = money::round_money(&total);
        if total <= money::zero() {
            return Err(AppError::Validation("Order total must be positive.".to_string()));
        }
        Ok((resolved, total))
    }

    #[allow(clippy::too_many_arguments)]
    async fn settle(
        &self,
        buyer_id: Uuid,
        stand: &StandContext,
        items: &[CartItem],
        total_amount: &BigDecimal,
        commission_rate: &BigDecimal,
        idempotency_key: Option<&str>,
        notes: &str,
    ) -> Result<Outcome, AppError> {
        let mut tx = self.pool.begin().await?;

        // Idempotency: a key that already landed returns the original order,
        // with no second charge.
        if let Some(key) = idempotency_key {
            if let Some(existing) = queries::find_order_by_idempotency_key(&mut *tx, key).await? {
                return Ok(Outcome::AlreadyExists(existing));
            }
        }

        let buyer_wallet = queries::get_or_create_wallet(&mut tx, buyer_id).await?;
        let buyer_wallet = queries::get_wallet_for_update(&mut tx, buyer_wallet.id).await?;
        if buyer_wallet.balance < *total_amount {
            return Err(AppError::InsufficientBalance("Insufficient wallet balance.".to_string()));
        }

        let (commission, net_to_stand) = money::split_commission(total_amount, commission_rate);

        let order = Order::new(
            buyer_id,
            stand.stand_id,
            total_amount.clone(),
            notes.to_string(),
            idempotency_key.map(str::to_string),
        );
        let order = match queries::insert_order(&mut tx, &order).await {
            Ok(order) => order,
            Err(err)
                if is_unique_violation(&err, IDEMPOTENCY_KEY_CONSTRAINT)
                    && idempotency_key.is_some() =>
            {
                // The constraint, not this transaction, decides the winner.
                return Ok(Outcome::KeyConflict(
                    idempotency_key.unwrap_or_default().to_string(),
                ));
            }
            Err(err) => return Err(err.into()),
        };

        for item in items {
            let row = OrderItem::new(order.id, item.product_id, item.quantity, item.unit_price.clone());
            queries::insert_order_item(&mut tx, &row).await?;
        }

        ledger::debit(
            &mut tx,
            buyer_wallet.id,
            total_amount,
            Some(order.id),
            &format!("Order #{}", order.id),
        )
        .await?;

        let stand_admin = queries::find_stand_admin(&mut *tx, stand.stand_id, false).await?;
        if let Some(admin) = stand_admin {
            if admin.id != buyer_id && net_to_stand > money::zero() {
                let admin_wallet = queries::get_or_create_wallet(&mut tx, admin.id).await?;
                ledger::credit(
                    &mut tx,
                    admin_wallet.id,
                    &net_to_stand,
                    Some(order.id),
                    &format!("Order #{} (net)", order.id),
                )
                .await?;
            }
        }

        if commission > money::zero() {
            let platform_wallet = ledger::platform_wallet(&mut tx, &self.platform_key).await?;
            ledger::credit(
                &mut tx,
                platform_wallet.id,
                &commission,
                Some(order.id),
                &format!("Order #{} (commission)", order.id),
            )
            .await?;
        }

        orders::complete_within(&mut tx, order.id).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            total = %total_amount,
            commission = %commission,
            "checkout settled"
        );

        let order = queries::get_order(&self.pool, order.id)
            .await?
            .ok_or_else(|| AppError::Internal("order vanished after checkout".to_string()))?;
        debug_assert_eq!(order.status, OrderStatus::Completed.as_str());
        Ok(Outcome::Settled(order))
    }
}
