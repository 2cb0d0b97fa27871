//! Fixed-point currency conversion.
//!
//! Rates are quoted as units of the source currency per one unit of the
//! accounting currency (e.g. IRR per CAD), so converting a source amount
//! divides by the rate. Every result is rounded to [`CONVERSION_SCALE`]
//! places with banker's rounding, so repeated partial conversions of the
//! same balance do not drift.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{FxError, FxResult};

/// Decimal places kept on converted amounts.
pub const CONVERSION_SCALE: u32 = 10;

fn ensure_positive(rate: Decimal) -> FxResult<()> {
    if rate <= Decimal::ZERO {
        return Err(FxError::InvalidRate { rate });
    }
    Ok(())
}

fn scale(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CONVERSION_SCALE, RoundingStrategy::MidpointNearestEven)
}

/// Convert `amount` at `rate`: `amount / rate`.
pub fn convert(amount: Decimal, rate: Decimal) -> FxResult<Decimal> {
    ensure_positive(rate)?;
    amount
        .checked_div(rate)
        .map(scale)
        .ok_or(FxError::Overflow { amount, rate })
}

/// Apply a target-per-source rate: `amount * rate`.
pub fn apply_rate(amount: Decimal, rate: Decimal) -> FxResult<Decimal> {
    ensure_positive(rate)?;
    amount
        .checked_mul(rate)
        .map(scale)
        .ok_or(FxError::Overflow { amount, rate })
}

/// Profit realised when `amount` bought at `buy_rate` is sold at `sell_rate`,
/// expressed in the accounting currency: `amount/buy - amount/sell`.
pub fn spread_profit(amount: Decimal, buy_rate: Decimal, sell_rate: Decimal) -> FxResult<Decimal> {
    Ok(convert(amount, buy_rate)? - convert(amount, sell_rate)?)
}
