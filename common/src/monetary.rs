//! Amounts and currency codes.
//!
//! All amounts are `rust_decimal::Decimal`. Binary floating point never
//! touches money.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SarafiError};

/// An amount tagged with the currency it is denominated in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub value: Decimal,
    pub currency: Currency,
}

impl Money {
    pub fn new(value: Decimal, currency: Currency) -> Self {
        Self { value, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.value.is_sign_positive() && !self.value.is_zero()
    }

    /// Rounded to the number of minor units the currency uses.
    pub fn rounded(&self) -> Money {
        Money::new(
            self.value.round_dp(self.currency.decimal_places()),
            self.currency.clone(),
        )
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

/// Three-letter currency code, stored upper case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Upper-cases `code`. Use [`Currency::is_valid`] or `parse` to check it.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0.len() == 3 && self.0.bytes().all(|b| b.is_ascii_uppercase())
    }

    /// Minor units kept when rounding amounts in this currency.
    ///
    /// The rial has no subunit in practice.
    pub fn decimal_places(&self) -> u32 {
        match self.code() {
            "IRR" | "JPY" | "KRW" | "VND" => 0,
            "BHD" | "KWD" | "OMR" | "IQD" => 3,
            _ => 2,
        }
    }

    /// Iranian rial, the denomination of remittance balances.
    pub fn irr() -> Self {
        Self::new("IRR")
    }

    /// Canadian dollar, the accounting currency for settlement profit.
    pub fn cad() -> Self {
        Self::new("CAD")
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }
}

impl FromStr for Currency {
    type Err = SarafiError;

    fn from_str(s: &str) -> Result<Self> {
        let currency = Currency::new(s.trim());
        if !currency.is_valid() {
            return Err(SarafiError::invalid_field(
                "currency",
                format!("'{}' is not a currency code", s),
            ));
        }
        Ok(currency)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction of a conversion: `base` is converted into `quote`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: Currency,
    pub quote: Currency,
}

impl CurrencyPair {
    pub fn new(base: Currency, quote: Currency) -> Self {
        Self { base, quote }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}
