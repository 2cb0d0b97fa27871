//! Remaining-balance tracking shared by outgoing and incoming remittances.

use rust_decimal::Decimal;
use sarafi_common::{Result, SarafiError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settlement progress of a remittance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemittanceStatus {
    /// Nothing settled yet.
    Open,
    /// Some, but not all, of the amount is settled.
    PartiallySettled,
    /// Remaining balance is zero.
    Completed,
    /// Withdrawn before any settlement.
    Cancelled,
}

impl RemittanceStatus {
    /// Terminal remittances accept no further settlements.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemittanceStatus::Completed | RemittanceStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemittanceStatus::Open => "open",
            RemittanceStatus::PartiallySettled => "partially_settled",
            RemittanceStatus::Completed => "completed",
            RemittanceStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RemittanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemittanceStatus {
    type Err = SarafiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(RemittanceStatus::Open),
            "partially_settled" => Ok(RemittanceStatus::PartiallySettled),
            "completed" => Ok(RemittanceStatus::Completed),
            "cancelled" => Ok(RemittanceStatus::Cancelled),
            other => Err(SarafiError::invalid_field(
                "status",
                format!("unknown remittance status '{}'", other),
            )),
        }
    }
}

/// Amount, settled and remaining IRR plus accumulated profit.
///
/// `version` increases on every mutation and backs the optimistic
/// concurrency check in the stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemittanceBalance {
    /// Original amount in IRR.
    pub amount_irr: Decimal,
    /// IRR allocated through settlements so far.
    pub settled_irr: Decimal,
    /// `amount_irr - settled_irr`, never negative.
    pub remaining_irr: Decimal,
    /// Sum of the profit of every settlement touching this remittance.
    pub total_profit_cad: Decimal,
    /// Current status.
    pub status: RemittanceStatus,
    /// Row version.
    pub version: i64,
}

impl RemittanceBalance {
    /// Create an open balance for `amount_irr`.
    pub fn new(amount_irr: Decimal) -> Self {
        Self {
            amount_irr,
            settled_irr: Decimal::ZERO,
            remaining_irr: amount_irr,
            total_profit_cad: Decimal::ZERO,
            status: RemittanceStatus::Open,
            version: 0,
        }
    }

    /// Check if `amount` can be allocated right now.
    pub fn can_allocate(&self, amount: Decimal) -> bool {
        !self.status.is_terminal() && amount > Decimal::ZERO && amount <= self.remaining_irr
    }

    /// Allocate `amount` to a settlement that realised `profit_cad`.
    pub fn allocate(&mut self, entity: &'static str, amount: Decimal, profit_cad: Decimal) -> Result<()> {
        if self.status.is_terminal() {
            return Err(SarafiError::InvalidTransition {
                from: self.status.to_string(),
                to: RemittanceStatus::PartiallySettled.to_string(),
            });
        }
        if amount <= Decimal::ZERO {
            return Err(SarafiError::invalid_field("amount", "amount must be positive"));
        }
        if amount > self.remaining_irr {
            return Err(SarafiError::InsufficientBalance {
                entity,
                required: amount.to_string(),
                available: self.remaining_irr.to_string(),
            });
        }

        self.settled_irr += amount;
        self.remaining_irr -= amount;
        self.total_profit_cad += profit_cad;
        self.status = if self.remaining_irr.is_zero() {
            RemittanceStatus::Completed
        } else {
            RemittanceStatus::PartiallySettled
        };
        self.version += 1;
        Ok(())
    }

    /// Cancel an untouched remittance.
    pub fn cancel(&mut self) -> Result<()> {
        if self.status != RemittanceStatus::Open || !self.settled_irr.is_zero() {
            return Err(SarafiError::InvalidTransition {
                from: self.status.to_string(),
                to: RemittanceStatus::Cancelled.to_string(),
            });
        }
        self.status = RemittanceStatus::Cancelled;
        self.version += 1;
        Ok(())
    }

    /// Check the balance equations and the completed-iff-zero rule.
    pub fn is_consistent(&self) -> bool {
        let arithmetic = self.remaining_irr >= Decimal::ZERO
            && self.remaining_irr == self.amount_irr - self.settled_irr;
        let status = match self.status {
            RemittanceStatus::Completed => self.remaining_irr.is_zero(),
            RemittanceStatus::Open => self.settled_irr.is_zero(),
            RemittanceStatus::PartiallySettled => {
                !self.settled_irr.is_zero() && !self.remaining_irr.is_zero()
            }
            RemittanceStatus::Cancelled => self.settled_irr.is_zero(),
        };
        arithmetic && status
    }
}
