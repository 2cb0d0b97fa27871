//! Payment method configuration and fee formulas.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sarafi_common::{BranchId, PaymentMethodId, Result, SarafiError, TenantId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decimal places kept on computed fees.
pub const FEE_SCALE: u32 = 2;

/// Ways a customer can pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodType {
    Cash,
    BankTransfer,
    Card,
    ETransfer,
    Cheque,
}

impl PaymentMethodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethodType::Cash => "cash",
            PaymentMethodType::BankTransfer => "bank_transfer",
            PaymentMethodType::Card => "card",
            PaymentMethodType::ETransfer => "e_transfer",
            PaymentMethodType::Cheque => "cheque",
        }
    }
}

impl fmt::Display for PaymentMethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethodType {
    type Err = SarafiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cash" => Ok(PaymentMethodType::Cash),
            "bank_transfer" => Ok(PaymentMethodType::BankTransfer),
            "card" => Ok(PaymentMethodType::Card),
            "e_transfer" => Ok(PaymentMethodType::ETransfer),
            "cheque" => Ok(PaymentMethodType::Cheque),
            other => Err(SarafiError::invalid_field(
                "method_type",
                format!("unknown payment method '{}'", other),
            )),
        }
    }
}

/// Fee charged for a payment. Percent values are percentages, so `1.5`
/// means 1.5% of the amount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "fee_type", rename_all = "snake_case")]
pub enum FeeFormula {
    #[default]
    None,
    Percent { percent: Decimal },
    Flat { flat: Decimal },
    PercentPlusFlat { percent: Decimal, flat: Decimal },
}

fn non_negative(field: &'static str, value: Option<Decimal>) -> Result<Decimal> {
    let value = value.ok_or_else(|| SarafiError::invalid_field(field, format!("{} is required", field)))?;
    if value < Decimal::ZERO {
        return Err(SarafiError::invalid_field(field, format!("{} cannot be negative", field)));
    }
    Ok(value)
}

impl FeeFormula {
    /// Build a formula from its stored or submitted parts.
    ///
    /// Unknown fee types and missing components are rejected.
    pub fn from_parts(fee_type: &str, percent: Option<Decimal>, flat: Option<Decimal>) -> Result<Self> {
        match fee_type {
            "none" => Ok(FeeFormula::None),
            "percent" => Ok(FeeFormula::Percent {
                percent: non_negative("fee_percent", percent)?,
            }),
            "flat" => Ok(FeeFormula::Flat {
                flat: non_negative("fee_flat", flat)?,
            }),
            "percent_plus_flat" => Ok(FeeFormula::PercentPlusFlat {
                percent: non_negative("fee_percent", percent)?,
                flat: non_negative("fee_flat", flat)?,
            }),
            other => Err(SarafiError::invalid_field(
                "fee_type",
                format!("unknown fee type '{}'", other),
            )),
        }
    }

    pub fn fee_type(&self) -> &'static str {
        match self {
            FeeFormula::None => "none",
            FeeFormula::Percent { .. } => "percent",
            FeeFormula::Flat { .. } => "flat",
            FeeFormula::PercentPlusFlat { .. } => "percent_plus_flat",
        }
    }

    pub fn percent(&self) -> Option<Decimal> {
        match self {
            FeeFormula::Percent { percent } | FeeFormula::PercentPlusFlat { percent, .. } => Some(*percent),
            _ => None,
        }
    }

    pub fn flat(&self) -> Option<Decimal> {
        match self {
            FeeFormula::Flat { flat } | FeeFormula::PercentPlusFlat { flat, .. } => Some(*flat),
            _ => None,
        }
    }

    /// Re-check component signs on an already-built formula.
    pub fn validate(&self) -> Result<()> {
        Self::from_parts(self.fee_type(), self.percent(), self.flat()).map(|_| ())
    }

    /// Fee for `amount`, rounded half away from zero to [`FEE_SCALE`] places.
    pub fn fee_for(&self, amount: Decimal) -> Decimal {
        let hundred = Decimal::ONE_HUNDRED;
        let fee = match *self {
            FeeFormula::None => Decimal::ZERO,
            FeeFormula::Percent { percent } => amount * percent / hundred,
            FeeFormula::Flat { flat } => flat,
            FeeFormula::PercentPlusFlat { percent, flat } => amount * percent / hundred + flat,
        };
        fee.round_dp_with_strategy(FEE_SCALE, RoundingStrategy::MidpointAwayFromZero)
    }
}

/// A payment method as configured for a tenant, or for one of its branches.
///
/// A row with `branch_id = None` applies tenant-wide. A branch row for the
/// same method type takes precedence over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethodConfig {
    pub id: PaymentMethodId,
    pub tenant_id: TenantId,
    pub branch_id: Option<BranchId>,
    pub method_type: PaymentMethodType,
    pub display_name: String,
    pub enabled: bool,
    #[serde(flatten)]
    pub fee: FeeFormula,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set on soft delete. Deleted rows are invisible to lookups.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PaymentMethodConfig {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Check `amount` against the enabled flag and the bounds.
    pub fn check_amount(&self, amount: Decimal) -> Result<()> {
        if !self.enabled {
            return Err(SarafiError::invalid_field(
                "payment_method",
                format!("{} is disabled", self.display_name),
            ));
        }
        if let Some(min) = self.min_amount {
            if amount < min {
                return Err(SarafiError::invalid_field(
                    "amount",
                    format!("amount {} is below the {} minimum of {}", amount, self.display_name, min),
                ));
            }
        }
        if let Some(max) = self.max_amount {
            if amount > max {
                return Err(SarafiError::invalid_field(
                    "amount",
                    format!("amount {} exceeds the {} maximum of {}", amount, self.display_name, max),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.display_name.trim().is_empty() {
            return Err(SarafiError::invalid_field("display_name", "display_name is required"));
        }
        self.fee.validate()?;
        for (field, bound) in [("min_amount", self.min_amount), ("max_amount", self.max_amount)] {
            if matches!(bound, Some(b) if b < Decimal::ZERO) {
                return Err(SarafiError::invalid_field(field, format!("{} cannot be negative", field)));
            }
        }
        if let (Some(min), Some(max)) = (self.min_amount, self.max_amount) {
            if min > max {
                return Err(SarafiError::invalid_field("min_amount", "min_amount exceeds max_amount"));
            }
        }
        Ok(())
    }
}

/// Input for configuring a payment method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPaymentMethodConfig {
    pub tenant_id: TenantId,
    pub branch_id: Option<BranchId>,
    pub method_type: PaymentMethodType,
    pub display_name: String,
    pub enabled: bool,
    pub fee: FeeFormula,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub sort_order: i32,
}

/// Partial update. `None` leaves a field untouched; the bound fields use a
/// nested option so a bound can be cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentMethodUpdate {
    pub display_name: Option<String>,
    pub enabled: Option<bool>,
    pub fee: Option<FeeFormula>,
    pub min_amount: Option<Option<Decimal>>,
    pub max_amount: Option<Option<Decimal>>,
    pub sort_order: Option<i32>,
}

impl PaymentMethodUpdate {
    pub(crate) fn apply(self, config: &mut PaymentMethodConfig) {
        if let Some(name) = self.display_name {
            config.display_name = name.trim().to_string();
        }
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(fee) = self.fee {
            config.fee = fee;
        }
        if let Some(min) = self.min_amount {
            config.min_amount = min;
        }
        if let Some(max) = self.max_amount {
            config.max_amount = max;
        }
        if let Some(order) = self.sort_order {
            config.sort_order = order;
        }
    }
}
