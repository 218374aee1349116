use sqlx::{PgExecutor, Postgres, Result, Transaction as SqlxTransaction};
use sqlx::types::BigDecimal;
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::db::models::{
    FinancialAuditLog, Order, OrderItem, Product, StandContext, User, Wallet, WalletTransaction,
};
use crate::domain::TransactionType;

// --- Wallet queries ---

/// Get-or-create the wallet for `user_id`. Safe under concurrent callers:
/// the insert is ON CONFLICT DO NOTHING on the user_id uniqueness.
pub async fn get_or_create_wallet(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<Wallet> {
    let wallet = Wallet::new(user_id);
    sqlx::query(
        r#"
        INSERT INTO wallets (id, user_id, balance, currency, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(wallet.id)
    .bind(wallet.user_id)
    .bind(&wallet.balance)
    .bind(&wallet.currency)
    .bind(wallet.created_at)
    .bind(wallet.updated_at)
    .execute(&mut **executor)
    .await?;

    sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&mut **executor)
        .await
}

/// Re-read a wallet fresh under an exclusive row lock. Every balance check
/// goes through this; cached balances are never trusted.
pub async fn get_wallet_for_update(
    executor: &mut SqlxTransaction<'_, Postgres>,
    wallet_id: Uuid,
) -> Result<Wallet> {
    sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = $1 FOR UPDATE")
        .bind(wallet_id)
        .fetch_one(&mut **executor)
        .await
}

/// Lock a set of wallets in ascending id order. Stable ordering bounds
/// deadlock risk when an operation touches several wallets.
pub async fn lock_wallets_in_id_order(
    executor: &mut SqlxTransaction<'_, Postgres>,
    wallet_ids: &[Uuid],
) -> Result<()> {
    let mut sorted: Vec<Uuid> = wallet_ids.to_vec();
    sorted.sort();
    sorted.dedup();
    for id in sorted {
        sqlx::query("SELECT id FROM wallets WHERE id = $1 FOR UPDATE")
            .bind(id)
            .execute(&mut **executor)
            .await?;
    }
    Ok(())
}

pub async fn get_wallet_by_user<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
) -> Result<Option<Wallet>> {
    sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await
}

pub async fn update_wallet_balance(
    executor: &mut SqlxTransaction<'_, Postgres>,
    wallet_id: Uuid,
    new_balance: &BigDecimal,
) -> Result<()> {
    sqlx::query("UPDATE wallets SET balance = $1, updated_at = NOW() WHERE id = $2")
        .bind(new_balance)
        .bind(wallet_id)
        .execute(&mut **executor)
        .await?;
    Ok(())
}

pub async fn insert_wallet_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    entry: &WalletTransaction,
) -> Result<WalletTransaction> {
    sqlx::query_as::<_, WalletTransaction>(
        r#"
        INSERT INTO wallet_transactions (
            id, wallet_id, amount, entry_type, order_id, description, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(entry.id)
    .bind(entry.wallet_id)
    .bind(&entry.amount)
    .bind(&entry.entry_type)
    .bind(entry.order_id)
    .bind(&entry.description)
    .bind(entry.created_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn list_wallet_transactions<'e>(
    executor: impl PgExecutor<'e>,
    wallet_id: Uuid,
    limit: i64,
) -> Result<Vec<WalletTransaction>> {
    sqlx::query_as::<_, WalletTransaction>(
        "SELECT * FROM wallet_transactions WHERE wallet_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(wallet_id)
    .bind(limit)
    .fetch_all(executor)
    .await
}

// --- Tenancy queries ---

pub async fn get_user<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
    include_deleted: bool,
) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND (is_deleted = FALSE OR $2)")
        .bind(user_id)
        .bind(include_deleted)
        .fetch_optional(executor)
        .await
}

/// First STAND_ADMIN linked to the stand; the payee for the net amount.
pub async fn find_stand_admin<'e>(
    executor: impl PgExecutor<'e>,
    stand_id: Uuid,
    include_deleted: bool,
) -> Result<Option<User>> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT * FROM users
        WHERE stand_id = $1
        AND role = 'STAND_ADMIN'
        AND (is_deleted = FALSE OR $2)
        ORDER BY created_at
        LIMIT 1
        "#,
    )
    .bind(stand_id)
    .bind(include_deleted)
    .fetch_optional(executor)
    .await
}

/// Stand joined with its organization's commission rate. The organization is
/// followed through the FK regardless of soft deletion, matching how order
/// pricing resolves it.
pub async fn get_stand_context<'e>(
    executor: impl PgExecutor<'e>,
    stand_id: Uuid,
) -> Result<Option<StandContext>> {
    sqlx::query_as::<_, StandContext>(
        r#"
        SELECT s.id AS stand_id,
               s.name AS stand_name,
               o.id AS organization_id,
               o.commission_rate AS commission_rate
        FROM stands s
        LEFT JOIN events e ON e.id = s.event_id
        LEFT JOIN organizations o ON o.id = e.organization_id
        WHERE s.id = $1
        "#,
    )
    .bind(stand_id)
    .fetch_optional(executor)
    .await
}

pub async fn get_product_in_stand<'e>(
    executor: impl PgExecutor<'e>,
    product_id: Uuid,
    stand_id: Uuid,
) -> Result<Option<Product>> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 AND stand_id = $2")
        .bind(product_id)
        .bind(stand_id)
        .fetch_optional(executor)
        .await
}

/// Get-or-create the platform commission account by its well-known username.
pub async fn get_or_create_platform_user(
    executor: &mut SqlxTransaction<'_, Postgres>,
    platform_key: &str,
) -> Result<User> {
    sqlx::query(
        r#"
        INSERT INTO users (id, username, role, is_active)
        VALUES ($1, $2, 'SUPERADMIN', TRUE)
        ON CONFLICT (username) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(platform_key)
    .execute(&mut **executor)
    .await?;

    sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(platform_key)
        .fetch_one(&mut **executor)
        .await
}

// --- Order queries ---

pub async fn insert_order(
    executor: &mut SqlxTransaction<'_, Postgres>,
    order: &Order,
) -> Result<Order> {
    sqlx::query_as::<_, Order>(
        r#"
        INSERT INTO orders (
            id, user_id, stand_id, status, total_amount, notes,
            idempotency_key, is_reversed, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(order.id)
    .bind(order.user_id)
    .bind(order.stand_id)
    .bind(&order.status)
    .bind(&order.total_amount)
    .bind(&order.notes)
    .bind(&order.idempotency_key)
    .bind(order.is_reversed)
    .bind(order.created_at)
    .bind(order.updated_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn insert_order_item(
    executor: &mut SqlxTransaction<'_, Postgres>,
    item: &OrderItem,
) -> Result<OrderItem> {
    sqlx::query_as::<_, OrderItem>(
        r#"
        INSERT INTO order_items (id, order_id, product_id, quantity, unit_price, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(item.id)
    .bind(item.order_id)
    .bind(item.product_id)
    .bind(item.quantity)
    .bind(&item.unit_price)
    .bind(item.created_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_order<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<Option<Order>> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn lock_order(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<Order>> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **executor)
        .await
}

pub async fn find_order_by_idempotency_key<'e>(
    executor: impl PgExecutor<'e>,
    idempotency_key: &str,
) -> Result<Option<Order>> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE idempotency_key = $1")
        .bind(idempotency_key)
        .fetch_optional(executor)
        .await
}

pub async fn update_order_status(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    status: &str,
) -> Result<()> {
    sqlx::query("UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(&mut **executor)
        .await?;
    Ok(())
}

pub async fn mark_order_reversed(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
) -> Result<()> {
    sqlx::query("UPDATE orders SET is_reversed = TRUE, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&mut **executor)
        .await?;
    Ok(())
}

pub async fn list_orders<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Option<Uuid>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Order>> {
    sqlx::query_as::<_, Order>(
        r#"
        SELECT * FROM orders
        WHERE ($1::uuid IS NULL OR user_id = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await
}

pub async fn list_order_items<'e>(
    executor: impl PgExecutor<'e>,
    order_id: Uuid,
) -> Result<Vec<OrderItem>> {
    sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at")
        .bind(order_id)
        .fetch_all(executor)
        .await
}

pub async fn list_completed_order_ids<'e>(executor: impl PgExecutor<'e>) -> Result<Vec<Uuid>> {
    sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM orders WHERE status = 'COMPLETED' ORDER BY created_at",
    )
    .fetch_all(executor)
    .await
}

// --- Audit queries ---

pub async fn insert_audit_log(
    executor: &mut SqlxTransaction<'_, Postgres>,
    log: &FinancialAuditLog,
) -> Result<FinancialAuditLog> {
    sqlx::query_as::<_, FinancialAuditLog>(
        r#"
        INSERT INTO financial_audit_log (
            id, order_id, total_amount, commission_amount, net_amount,
            organization_id, stand_id, user_id, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(log.id)
    .bind(log.order_id)
    .bind(&log.total_amount)
    .bind(&log.commission_amount)
    .bind(&log.net_amount)
    .bind(log.organization_id)
    .bind(log.stand_id)
    .bind(log.user_id)
    .bind(log.created_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_audit_log_by_order<'e>(
    executor: impl PgExecutor<'e>,
    order_id: Uuid,
) -> Result<Option<FinancialAuditLog>> {
    sqlx::query_as::<_, FinancialAuditLog>("SELECT * FROM financial_audit_log WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(executor)
        .await
}

/// Sum of order-tagged entries of one direction on one user's wallet.
pub async fn sum_order_entries_for_user<'e>(
    executor: impl PgExecutor<'e>,
    order_id: Uuid,
    user_id: Uuid,
    entry_type: TransactionType,
) -> Result<BigDecimal> {
    sqlx::query_scalar::<_, BigDecimal>(
        r#"
        SELECT COALESCE(SUM(t.amount), 0)
        FROM wallet_transactions t
        JOIN wallets w ON w.id = t.wallet_id
        WHERE t.order_id = $1 AND w.user_id = $2 AND t.entry_type = $3
        "#,
    )
    .bind(order_id)
    .bind(user_id)
    .bind(entry_type.as_str())
    .fetch_one(executor)
    .await
}

pub async fn sum_wallet_balances<'e>(executor: impl PgExecutor<'e>) -> Result<BigDecimal> {
    sqlx::query_scalar::<_, BigDecimal>("SELECT COALESCE(SUM(balance), 0) FROM wallets")
        .fetch_one(executor)
        .await
}

pub async fn sum_entries_of_type<'e>(
    executor: impl PgExecutor<'e>,
    entry_type: TransactionType,
) -> Result<BigDecimal> {
    sqlx::query_scalar::<_, BigDecimal>(
        "SELECT COALESCE(SUM(amount), 0) FROM wallet_transactions WHERE entry_type = $1",
    )
    .bind(entry_type.as_str())
    .fetch_one(executor)
    .await
}

/// Snapshot rows joined with owner names for the CSV export.
#[derive(Debug, sqlx::FromRow)]
pub struct AuditExportRow {
    pub order_id: Uuid,
    pub username: Option<String>,
    pub organization_name: Option<String>,
    pub stand_name: Option<String>,
    pub total_amount: BigDecimal,
    pub commission_amount: BigDecimal,
    pub net_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
}

pub async fn list_audit_export_rows<'e>(
    executor: impl PgExecutor<'e>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<Vec<AuditExportRow>> {
    sqlx::query_as::<_, AuditExportRow>(
        r#"
        SELECT f.order_id,
               u.username AS username,
               o.name AS organization_name,
               s.name AS stand_name,
               f.total_amount,
               f.commission_amount,
               f.net_amount,
               f.created_at
        FROM financial_audit_log f
        LEFT JOIN users u ON u.id = f.user_id
        LEFT JOIN organizations o ON o.id = f.organization_id
        LEFT JOIN stands s ON s.id = f.stand_id
        WHERE ($1::timestamptz IS NULL OR f.created_at >= $1)
        AND ($2::timestamptz IS NULL OR f.created_at < $2)
        ORDER BY f.created_at
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(executor)
    .await
}

pub async fn find_user_by_username<'e>(
    executor: impl PgExecutor<'e>,
    username: &str,
) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(executor)
        .await
}
