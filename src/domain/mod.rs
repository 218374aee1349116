//! Framework-agnostic domain types for the wallet ledger and order flow.

pub mod ledger;
pub mod money;
pub mod order;

pub use ledger::TransactionType;
pub use money::round_money;
pub use order::OrderStatus;
