//! Financial audit: immutable per-order snapshots, read-only reconciliation,
//! the global ledger balance invariant, and compensating reversal.
//!
//! `reconcile_order` and `verify_global_balance` never raise; inconsistency
//! is data, reported in-band, so one bad order cannot abort a batch scan.

use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use sqlx::types::BigDecimal;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::models::FinancialAuditLog;
use crate::db::queries;
use crate::domain::money;
use crate::domain::{OrderStatus, TransactionType};
use crate::error::AppError;
use crate::services::ledger;

/// Write the financial snapshot for an order that just became COMPLETED.
/// Idempotent: a snapshot that already exists is left untouched.
pub async fn record_completion(
    tx: &mut SqlxTransaction<'_, Postgres>,
    order_id: Uuid,
) -> Result<(), AppError> {
    if queries::get_audit_log_by_order(&mut **tx, order_id).await?.is_some() {
        return Ok(());
    }
    let order = queries::get_order(&mut **tx, order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;
    let stand = queries::get_stand_context(&mut **tx, order.stand_id).await?;
    let (organization_id, commission_rate) = match &stand {
        Some(ctx) => (
            ctx.organization_id,
            ctx.commission_rate.clone().unwrap_or_else(money::zero),
        ),
        None => (None, money::zero()),
    };
    let (commission, net) = money::split_commission(&order.total_amount, &commission_rate);

    let log = FinancialAuditLog::new(
        order.id,
        order.total_amount.clone(),
        commission,
        net,
        organization_id,
        Some(order.stand_id),
        Some(order.user_id),
    );
    queries::insert_audit_log(tx, &log).await?;
    tracing::debug!(order_id = %order_id, "financial snapshot written");
    Ok(())
}

/// Compensating money movement for a COMPLETED -> CANCELLED order, inside the
/// caller's transaction. No-op when the order was already reversed. Involved
/// wallets are locked in ascending id order before any movement.
pub async fn reverse_within(
    tx: &mut SqlxTransaction<'_, Postgres>,
    order_id: Uuid,
    platform_key: &str,
) -> Result<(), AppError> {
    let order = queries::lock_order(tx, order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;
    if order.is_reversed {
        return Ok(());
    }
    let audit = queries::get_audit_log_by_order(&mut **tx, order_id)
        .await?
        .ok_or_else(|| {
            AppError::Validation("Cannot reverse: no financial snapshot for this order".to_string())
        })?;

    let buyer_wallet = queries::get_or_create_wallet(tx, order.user_id).await?;
    let mut involved = vec![buyer_wallet.id];

    let stand_admin = queries::find_stand_admin(&mut **tx, order.stand_id, false).await?;
    let admin_wallet = match &stand_admin {
        Some(admin) if audit.net_amount > money::zero() => {
            let wallet = queries::get_or_create_wallet(tx, admin.id).await?;
            involved.push(wallet.id);
            Some(wallet)
        }
        _ => None,
    };
    let platform_wallet = if audit.commission_amount > money::zero() {
        let wallet = ledger::platform_wallet(tx, platform_key).await?;
        involved.push(wallet.id);
        Some(wallet)
    } else {
        None
    };

    queries::lock_wallets_in_id_order(tx, &involved).await?;

    ledger::credit(
        tx,
        buyer_wallet.id,
        &audit.total_amount,
        Some(order.id),
        &format!("Order #{} (reversal refund)", order.id),
    )
    .await?;

    if let Some(wallet) = admin_wallet {
        let fresh = queries::get_wallet_for_update(tx, wallet.id).await?;
        if fresh.balance < audit.net_amount {
            return Err(AppError::InsufficientBalance(
                "Stand admin wallet has insufficient balance for reversal".to_string(),
            ));
        }
        ledger::debit(
            tx,
            wallet.id,
            &audit.net_amount,
            Some(order.id),
            &format!("Order #{} (reversal)", order.id),
        )
        .await?;
    }

    if let Some(wallet) = platform_wallet {
        let fresh = queries::get_wallet_for_update(tx, wallet.id).await?;
        if fresh.balance < audit.commission_amount {
            return Err(AppError::InsufficientBalance(
                "Platform wallet has insufficient balance for reversal".to_string(),
            ));
        }
        ledger::debit(
            tx,
            wallet.id,
            &audit.commission_amount,
            Some(order.id),
            &format!("Order #{} (reversal)", order.id),
        )
        .await?;
    }

    queries::mark_order_reversed(tx, order.id).await?;
    tracing::info!(order_id = %order_id, "order reversed");
    Ok(())
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderReconciliation {
    pub order_id: Uuid,
    pub is_valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReconciliationReport {
    pub total_orders_checked: usize,
    pub inconsistencies_found: usize,
    pub details: Vec<OrderReconciliation>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceReport {
    #[schema(value_type = String)]
    pub wallet_total: BigDecimal,
    #[schema(value_type = String)]
    pub ledger_total: BigDecimal,
    #[schema(value_type = String)]
    pub difference: BigDecimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct AuditService {
    pool: PgPool,
    platform_key: String,
}

impl AuditService {
    pub fn new(pool: PgPool, platform_key: String) -> Self {
        Self { pool, platform_key }
    }

    /// Cross-check one order's snapshot against its ledger entries. Read-only
    /// and infallible: every problem, including unexpected internal errors,
    /// lands in the result's error list.
    pub async fn reconcile_order(&self, order_id: Uuid) -> OrderReconciliation {
        let mut result = OrderReconciliation {
            order_id,
            is_valid: true,
            errors: Vec::new(),
        };
        if let Err(err) = self.check_order(order_id, &mut result).await {
            result.is_valid = false;
            result.errors.push(err.to_string());
        }
        if !result.errors.is_empty() {
            result.is_valid = false;
        }
        result
    }

    async fn check_order(
        &self,
        order_id: Uuid,
        result: &mut OrderReconciliation,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let order = match queries::get_order(&mut *tx, order_id).await? {
            Some(order) if order.status == OrderStatus::Completed.as_str() => order,
            _ => {
                result.errors.push("Order not found or not COMPLETED".to_string());
                return Ok(());
            }
        };

        let audit = match queries::get_audit_log_by_order(&mut *tx, order_id).await? {
            Some(audit) => audit,
            None => {
                result.errors.push("No financial snapshot for this order".to_string());
                return Ok(());
            }
        };

        let expected = &audit.commission_amount + &audit.net_amount;
        if order.total_amount != expected {
            result.errors.push(format!(
                "total_amount ({}) != commission + net ({})",
                order.total_amount, expected
            ));
        }

        let user_debit =
            queries::sum_order_entries_for_user(&mut *tx, order_id, order.user_id, TransactionType::Debit)
                .await?;
        if user_debit != order.total_amount {
            result.errors.push(format!(
                "USER debit ({}) != order total_amount ({})",
                user_debit, order.total_amount
            ));
        }

        // Read-only path: a platform account that was never created simply
        // has no credits.
        let platform_credit =
            match queries::find_user_by_username(&mut *tx, &self.platform_key).await? {
                Some(platform) => {
                    queries::sum_order_entries_for_user(
                        &mut *tx,
                        order_id,
                        platform.id,
                        TransactionType::Credit,
                    )
                    .await?
                }
                None => money::zero(),
            };
        if platform_credit != audit.commission_amount {
            result.errors.push(format!(
                "PLATFORM credit ({}) != commission_amount ({})",
                platform_credit, audit.commission_amount
            ));
        }

        match queries::find_stand_admin(&mut *tx, order.stand_id, false).await? {
            Some(admin) => {
                let stand_credit = queries::sum_order_entries_for_user(
                    &mut *tx,
                    order_id,
                    admin.id,
                    TransactionType::Credit,
                )
                .await?;
                if stand_credit != audit.net_amount {
                    result.errors.push(format!(
                        "STAND credit ({}) != net_amount ({})",
                        stand_credit, audit.net_amount
                    ));
                }
            }
            None => {
                if audit.net_amount > money::zero() {
                    result
                        .errors
                        .push("Stand has no STAND_ADMIN but net_amount > 0".to_string());
                }
            }
        }

        Ok(())
    }

    /// Run reconciliation across every COMPLETED order.
    pub async fn reconcile_all(&self) -> Result<ReconciliationReport, AppError> {
        let order_ids = queries::list_completed_order_ids(&self.pool).await?;
        let mut details = Vec::with_capacity(order_ids.len());
        let mut inconsistencies_found = 0;
        for order_id in order_ids {
            let result = self.reconcile_order(order_id).await;
            if !result.is_valid {
                inconsistencies_found += 1;
            }
            details.push(result);
        }
        Ok(ReconciliationReport {
            total_orders_checked: details.len(),
            inconsistencies_found,
            details,
        })
    }

    /// The system-wide invariant: sum of wallet balances equals total credits
    /// minus total debits. difference must be 0 when the system is
    /// consistent. Never raises.
    pub async fn verify_global_balance(&self) -> BalanceReport {
        match self.balance_totals().await {
            Ok((wallet_total, ledger_total)) => {
                let difference = &wallet_total - &ledger_total;
                BalanceReport {
                    wallet_total,
                    ledger_total,
                    difference,
                    error: None,
                }
            }
            Err(err) => BalanceReport {
                wallet_total: money::zero(),
                ledger_total: money::zero(),
                difference: money::zero(),
                error: Some(err.to_string()),
            },
        }
    }

    async fn balance_totals(&self) -> Result<(BigDecimal, BigDecimal), AppError> {
        // Both aggregates read one repeatable-read snapshot so concurrent
        // writes cannot skew the comparison.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;
        let wallet_total = queries::sum_wallet_balances(&mut *tx).await?;
        let credit_sum = queries::sum_entries_of_type(&mut *tx, TransactionType::Credit).await?;
        let debit_sum = queries::sum_entries_of_type(&mut *tx, TransactionType::Debit).await?;
        Ok((wallet_total, credit_sum - debit_sum))
    }
}
