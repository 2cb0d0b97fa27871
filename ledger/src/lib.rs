//! Sarafi remittance ledger.
//!
//! Outgoing remittances (debts owed in IRR) are paid down by incoming
//! remittances through settlements. Each settlement shrinks both remaining
//! balances and books the buy/sell spread as CAD profit.

pub mod balance;
pub mod engine;
pub mod memory;
pub mod postgres;
pub mod remittance;
pub mod settlement;
pub mod store;

pub use balance::{RemittanceBalance, RemittanceStatus};
pub use engine::{LedgerConfig, SettlementEngine};
pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;
pub use remittance::{
    IncomingRemittance, NewIncomingRemittance, NewOutgoingRemittance, OutgoingRemittance,
    RemittanceFilter,
};
pub use settlement::{ProfitSummary, RemittanceSettlement, SettlementCommit};
pub use store::LedgerStore;
