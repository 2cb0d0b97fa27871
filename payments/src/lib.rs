//! Sarafi payment methods.
//!
//! Per-tenant payment method configs with optional per-branch overrides,
//! amount bounds and fee formulas.

pub mod memory;
pub mod method;
pub mod postgres;
pub mod service;
pub mod store;

pub use memory::InMemoryPaymentMethodStore;
pub use method::{
    FeeFormula, NewPaymentMethodConfig, PaymentMethodConfig, PaymentMethodType,
    PaymentMethodUpdate, FEE_SCALE,
};
pub use postgres::PgPaymentMethodStore;
pub use service::PaymentMethodService;
pub use store::PaymentMethodStore;
