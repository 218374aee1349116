use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::domain::{OrderStatus, TransactionType};

/// Balance holder for one owner. Created lazily (get-or-create), mutated only
/// via debit/credit under a row lock, never deleted.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: BigDecimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            balance: BigDecimal::from(0),
            currency: "USD".to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Append-only ledger entry. Rows are immutable once written; reversals are
/// new compensating entries.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub amount: BigDecimal,
    pub entry_type: String,
    pub order_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn new(
        wallet_id: Uuid,
        amount: BigDecimal,
        entry_type: TransactionType,
        order_id: Option<Uuid>,
        description: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_id,
            amount,
            entry_type: entry_type.as_str().to_string(),
            order_id,
            description,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stand_id: Uuid,
    pub status: String,
    pub total_amount: BigDecimal,
    pub notes: String,
    pub idempotency_key: Option<String>,
    pub is_reversed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        user_id: Uuid,
        stand_id: Uuid,
        total_amount: BigDecimal,
        notes: String,
        idempotency_key: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            stand_id,
            status: OrderStatus::Pending.as_str().to_string(),
            total_amount,
            notes,
            idempotency_key,
            is_reversed: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn new(order_id: Uuid, product_id: Uuid, quantity: i32, unit_price: BigDecimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            quantity,
            unit_price,
            created_at: Utc::now(),
        }
    }
}

/// Immutable snapshot of an order's financial breakdown, written the moment
/// the order is marked COMPLETED. total_amount = commission_amount + net_amount.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FinancialAuditLog {
    pub id: Uuid,
    pub order_id: Uuid,
    pub total_amount: BigDecimal,
    pub commission_amount: BigDecimal,
    pub net_amount: BigDecimal,
    pub organization_id: Option<Uuid>,
    pub stand_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl FinancialAuditLog {
    pub fn new(
        order_id: Uuid,
        total_amount: BigDecimal,
        commission_amount: BigDecimal,
        net_amount: BigDecimal,
        organization_id: Option<Uuid>,
        stand_id: Option<Uuid>,
        user_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            total_amount,
            commission_amount,
            net_amount,
            organization_id,
            stand_id,
            user_id,
            created_at: Utc::now(),
        }
    }
}

// Tenancy context rows. Their CRUD lives outside this service; the core only
// reads them (and lazily creates the platform account).

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    pub is_active: bool,
    pub organization_id: Option<Uuid>,
    pub stand_id: Option<Uuid>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub stand_id: Uuid,
    pub name: String,
    pub price: BigDecimal,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stand joined with its event's organization; what checkout and snapshot
/// creation need to price an order.
#[derive(Debug, Clone, FromRow)]
pub struct StandContext {
    pub stand_id: Uuid,
    pub stand_name: String,
    pub organization_id: Option<Uuid>,
    pub commission_rate: Option<BigDecimal>,
}
