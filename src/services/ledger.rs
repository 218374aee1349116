//! Safe mutation of wallet balances with an append-only transaction trail.
//!
//! `debit` and `credit` run inside a caller-owned database transaction and
//! re-read the wallet under an exclusive row lock before touching the
//! balance. Each successful call writes exactly one ledger entry and one
//! balance update inside that same atomic unit.

use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::db::models::{Wallet, WalletTransaction};
use crate::db::queries;
use crate::domain::money;
use crate::domain::TransactionType;
use crate::error::AppError;

pub async fn debit(
    tx: &mut SqlxTransaction<'_, Postgres>,
    wallet_id: Uuid,
    amount: &BigDecimal,
    order_id: Option<Uuid>,
    description: &str,
) -> Result<WalletTransaction, AppError> {
    if *amount <= money::zero() {
        return Err(AppError::Validation("Debit amount must be positive.".to_string()));
    }
    let wallet = queries::get_wallet_for_update(tx, wallet_id).await?;
    if wallet.balance < *amount {
        return Err(AppError::InsufficientBalance("Insufficient balance".to_string()));
    }
    let new_balance = &wallet.balance - amount;
    queries::update_wallet_balance(tx, wallet.id, &new_balance).await?;

    let description = if description.is_empty() { "Debit" } else { description };
    let entry = WalletTransaction::new(
        wallet.id,
        amount.clone(),
        TransactionType::Debit,
        order_id,
        description.to_string(),
    );
    let entry = queries::insert_wallet_transaction(tx, &entry).await?;
    tracing::debug!(wallet_id = %wallet.id, amount = %amount, "debited wallet");
    Ok(entry)
}

pub async fn credit(
    tx: &mut SqlxTransaction<'_, Postgres>,
    wallet_id: Uuid,
    amount: &BigDecimal,
    order_id: Option<Uuid>,
    description: &str,
) -> Result<WalletTransaction, AppError> {
    if *amount <= money::zero() {
        return Err(AppError::Validation("Credit amount must be positive.".to_string()));
    }
    let wallet = queries::get_wallet_for_update(tx, wallet_id).await?;
    let new_balance = &wallet.balance + amount;
    queries::update_wallet_balance(tx, wallet.id, &new_balance).await?;

    let description = if description.is_empty() { "Credit" } else { description };
    let entry = WalletTransaction::new(
        wallet.id,
        amount.clone(),
        TransactionType::Credit,
        order_id,
        description.to_string(),
    );
    let entry = queries::insert_wallet_transaction(tx, &entry).await?;
    tracing::debug!(wallet_id = %wallet.id, amount = %amount, "credited wallet");
    Ok(entry)
}

/// Resolve the platform commission wallet by its well-known account key,
/// creating the account and wallet on first use.
pub async fn platform_wallet(
    tx: &mut SqlxTransaction<'_, Postgres>,
    platform_key: &str,
) -> Result<Wallet, AppError> {
    let platform_user = queries::get_or_create_platform_user(tx, platform_key).await?;
    let wallet = queries::get_or_create_wallet(tx, platform_user.id).await?;
    Ok(wallet)
}

#[derive(Clone)]
pub struct LedgerService {
    pool: PgPool,
}

impl LedgerService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Privileged credit with no order tag (the add-funds surface).
    pub async fn add_funds(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
        description: &str,
    ) -> Result<Wallet, AppError> {
        if *amount <= money::zero() {
            return Err(AppError::Validation("Credit amount must be positive.".to_string()));
        }
        let mut tx = self.pool.begin().await?;
        let wallet = queries::get_or_create_wallet(&mut tx, user_id).await?;
        credit(&mut tx, wallet.id, amount, None, description).await?;
        tx.commit().await?;

        queries::get_wallet_by_user(&self.pool, user_id)
            .await?
            .ok_or_else(|| AppError::Internal("wallet vanished after add_funds".to_string()))
    }

    pub async fn wallet_for_user(&self, user_id: Uuid) -> Result<Wallet, AppError> {
        let mut tx = self.pool.begin().await?;
        let wallet = queries::get_or_create_wallet(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(wallet)
    }

    pub async fn transactions_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<WalletTransaction>, AppError> {
        let wallet = queries::get_wallet_by_user(&self.pool, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No wallet for this user".to_string()))?;
        Ok(queries::list_wallet_transactions(&self.pool, wallet.id, limit).await?)
    }
}
