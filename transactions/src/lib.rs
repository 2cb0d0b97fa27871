//! Sarafi exchange transactions.
//!
//! A transaction converts a send amount at an applied rate. Its profit is
//! measured against the market rate in the target currency and stays
//! pending until a market rate is available.

pub mod memory;
pub mod postgres;
pub mod service;
pub mod store;
pub mod transaction;

pub use memory::InMemoryTransactionStore;
pub use postgres::PgTransactionStore;
pub use service::{CurrencyProfit, RecalculationReport, TransactionProfitSummary, TransactionService};
pub use store::TransactionStore;
pub use transaction::{calculate_profit, NewTransaction, ProfitStatus, Transaction};
