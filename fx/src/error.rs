//! FX error types.

use rust_decimal::Decimal;
use sarafi_common::{CurrencyPair, SarafiError};
use thiserror::Error;

/// Errors that can occur during rate lookup or conversion.
#[derive(Debug, Error)]
pub enum FxError {
    /// Rate not available for the requested currency pair.
    #[error("Rate not available for {0}")]
    RateNotAvailable(CurrencyPair),

    /// Newest known rate is older than the allowed age.
    #[error("Rate for {0} is stale")]
    RateStale(CurrencyPair),

    /// Rate is zero or negative.
    #[error("Invalid rate {rate}: must be positive")]
    InvalidRate { rate: Decimal },

    /// Decimal arithmetic overflowed.
    #[error("Arithmetic overflow converting {amount} at {rate}")]
    Overflow { amount: Decimal, rate: Decimal },

    /// Provider returned an error.
    #[error("Rate provider error: {0}")]
    ProviderError(String),
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;

impl From<FxError> for SarafiError {
    fn from(err: FxError) -> Self {
        match err {
            FxError::RateNotAvailable(pair) | FxError::RateStale(pair) => {
                SarafiError::not_found("exchange rate", pair)
            }
            FxError::InvalidRate { .. } | FxError::Overflow { .. } => {
                SarafiError::invalid_field("rate", err.to_string())
            }
            FxError::ProviderError(message) => SarafiError::Database(message),
        }
    }
}
