//! Sarafi FX
//!
//! Fixed-point rate conversion and market-rate lookup.
//!
//! # Example
//!
//! ```rust,ignore
//! use sarafi_fx::{convert, spread_profit};
//!
//! // 350M IRR bought at 50,000 IRR/CAD
//! let cost_cad = convert(dec!(350000000), dec!(50000))?;
//!
//! // profit when the same rials are sold at 52,000 IRR/CAD
//! let profit_cad = spread_profit(dec!(350000000), dec!(50000), dec!(52000))?;
//! ```

pub mod cache;
pub mod conversion;
pub mod error;
pub mod postgres;
pub mod provider;

pub use cache::CachedRateProvider;
pub use conversion::{apply_rate, convert, spread_profit, CONVERSION_SCALE};
pub use error::{FxError, FxResult};
pub use postgres::PgRateProvider;
pub use provider::{ExchangeRate, RateProvider, StaticRateProvider};
