//! Exchange transactions and their profit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sarafi_common::{
    BranchId, Currency, CurrencyPair, CustomerId, Money, Result, SarafiError, TenantId,
    TransactionId, UserId,
};
use sarafi_payments::PaymentMethodType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a transaction's profit is known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfitStatus {
    /// No usable market rate yet; profit reads as zero.
    Pending,
    Calculated,
}

impl ProfitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfitStatus::Pending => "pending",
            ProfitStatus::Calculated => "calculated",
        }
    }
}

impl fmt::Display for ProfitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfitStatus {
    type Err = SarafiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ProfitStatus::Pending),
            "calculated" => Ok(ProfitStatus::Calculated),
            other => Err(SarafiError::invalid_field(
                "profit_status",
                format!("unknown profit status '{}'", other),
            )),
        }
    }
}

/// Profit in the target currency: `send * standard - send * applied`.
///
/// Positive when the customer received less than the market rate would
/// have given them. Rounded to the target currency's decimal places.
pub fn calculate_profit(
    send_amount: Decimal,
    rate_applied: Decimal,
    standard_rate: Decimal,
    target: &Currency,
) -> Result<Decimal> {
    let at_market = sarafi_fx::apply_rate(send_amount, standard_rate)?;
    let at_applied = sarafi_fx::apply_rate(send_amount, rate_applied)?;
    Ok((at_market - at_applied).round_dp(target.decimal_places()))
}

/// A currency conversion performed for a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub tenant_id: TenantId,
    pub branch_id: Option<BranchId>,
    pub customer_id: Option<CustomerId>,
    /// What the customer handed over.
    pub send: Money,
    /// `send * rate_applied`, in the target currency.
    pub receive: Money,
    /// Target units per source unit given to the customer.
    pub rate_applied: Decimal,
    /// Market rate the profit is measured against, once known.
    pub standard_rate: Option<Decimal>,
    /// In the target currency. Zero while pending.
    pub profit: Money,
    /// Payment method fee, in the send currency.
    pub fee: Money,
    pub payment_method: Option<PaymentMethodType>,
    pub profit_status: ProfitStatus,
    pub profit_calculated_at: Option<DateTime<Utc>>,
    /// Last time a market rate was looked up for this transaction.
    /// Recalculation visits the least recently checked rows first.
    pub profit_checked_at: Option<DateTime<Utc>>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.send.currency.clone(), self.receive.currency.clone())
    }

    /// Compute profit against `standard_rate` and mark it calculated.
    pub fn apply_standard_rate(&mut self, standard_rate: Decimal) -> Result<()> {
        if standard_rate <= Decimal::ZERO {
            return Err(SarafiError::invalid_field("standard_rate", "standard rate must be positive"));
        }
        let profit = calculate_profit(
            self.send.value,
            self.rate_applied,
            standard_rate,
            &self.receive.currency,
        )?;

        let now = Utc::now();
        self.standard_rate = Some(standard_rate);
        self.profit = Money::new(profit, self.receive.currency.clone());
        self.profit_status = ProfitStatus::Calculated;
        self.profit_calculated_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Record that a rate lookup was attempted now.
    pub fn mark_checked(&mut self) {
        self.profit_checked_at = Some(Utc::now());
    }

    pub fn is_pending(&self) -> bool {
        self.profit_status == ProfitStatus::Pending
    }
}

/// Input for recording a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub tenant_id: TenantId,
    pub branch_id: Option<BranchId>,
    pub customer_id: Option<CustomerId>,
    pub send_amount: Decimal,
    pub send_currency: Currency,
    pub receive_currency: Currency,
    pub rate_applied: Decimal,
    pub payment_method: Option<PaymentMethodType>,
}

impl NewTransaction {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.send_amount <= Decimal::ZERO {
            return Err(SarafiError::invalid_field("send_amount", "send amount must be positive"));
        }
        if self.rate_applied <= Decimal::ZERO {
            return Err(SarafiError::invalid_field("rate_applied", "rate must be positive"));
        }
        for (field, currency) in [
            ("send_currency", &self.send_currency),
            ("receive_currency", &self.receive_currency),
        ] {
            if !currency.is_valid() {
                return Err(SarafiError::invalid_field(
                    field,
                    format!("'{}' is not a currency code", currency),
                ));
            }
        }
        if self.send_currency == self.receive_currency {
            return Err(SarafiError::invalid_field(
                "receive_currency",
                "send and receive currencies must differ",
            ));
        }
        Ok(())
    }
}
