//! Outgoing and incoming remittances.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sarafi_common::{BranchId, RemittanceId, Result, SarafiError, TenantId, UserId};
use serde::{Deserialize, Serialize};

use crate::balance::{RemittanceBalance, RemittanceStatus};

/// A debt owed to the bureau's correspondent, in IRR, paid down by
/// incoming funds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingRemittance {
    pub id: RemittanceId,
    pub tenant_id: TenantId,
    pub branch_id: Option<BranchId>,
    pub sender_name: String,
    pub recipient_name: String,
    pub recipient_account: Option<String>,
    /// IRR per CAD at which the rials were acquired.
    pub buy_rate_cad: Decimal,
    /// `amount_irr / buy_rate_cad`.
    pub equivalent_cad: Decimal,
    #[serde(flatten)]
    pub balance: RemittanceBalance,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Funds received that can pay down outgoing remittances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingRemittance {
    pub id: RemittanceId,
    pub tenant_id: TenantId,
    pub branch_id: Option<BranchId>,
    pub sender_name: String,
    pub recipient_name: String,
    pub sender_account: Option<String>,
    /// IRR per CAD at which the rials are disposed of.
    pub sell_rate_cad: Decimal,
    /// `amount_irr / sell_rate_cad`.
    pub equivalent_cad: Decimal,
    #[serde(flatten)]
    pub balance: RemittanceBalance,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for recording an outgoing remittance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOutgoingRemittance {
    pub tenant_id: TenantId,
    pub branch_id: Option<BranchId>,
    pub sender_name: String,
    pub recipient_name: String,
    pub recipient_account: Option<String>,
    pub amount_irr: Decimal,
    pub buy_rate_cad: Decimal,
    pub notes: Option<String>,
}

/// Input for recording an incoming remittance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIncomingRemittance {
    pub tenant_id: TenantId,
    pub branch_id: Option<BranchId>,
    pub sender_name: String,
    pub recipient_name: String,
    pub sender_account: Option<String>,
    pub amount_irr: Decimal,
    pub sell_rate_cad: Decimal,
    pub notes: Option<String>,
}

/// Listing filter shared by both remittance kinds.
#[derive(Debug, Clone, Default)]
pub struct RemittanceFilter {
    pub status: Option<RemittanceStatus>,
    pub branch_id: Option<BranchId>,
}

impl RemittanceFilter {
    pub fn with_status(status: RemittanceStatus) -> Self {
        Self {
            status: Some(status),
            branch_id: None,
        }
    }

    pub fn matches(&self, status: RemittanceStatus, branch_id: Option<BranchId>) -> bool {
        self.status.map_or(true, |s| s == status)
            && self.branch_id.map_or(true, |b| Some(b) == branch_id)
    }
}

fn require_name(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SarafiError::invalid_field(field, format!("{} is required", field)));
    }
    Ok(())
}

fn require_positive(field: &'static str, value: Decimal) -> Result<()> {
    if value <= Decimal::ZERO {
        return Err(SarafiError::invalid_field(field, format!("{} must be positive", field)));
    }
    Ok(())
}

/// Rials have no subunit; balances are stored as whole numbers.
pub(crate) fn require_whole_rials(field: &'static str, value: Decimal) -> Result<()> {
    if !value.fract().is_zero() {
        return Err(SarafiError::invalid_field(
            field,
            format!("{} must be a whole number of rials", field),
        ));
    }
    Ok(())
}

impl OutgoingRemittance {
    /// Validate input and compute the CAD equivalent.
    pub fn create(input: NewOutgoingRemittance, actor: UserId) -> Result<Self> {
        require_name("sender_name", &input.sender_name)?;
        require_name("recipient_name", &input.recipient_name)?;
        require_positive("amount_irr", input.amount_irr)?;
        require_whole_rials("amount_irr", input.amount_irr)?;
        require_positive("buy_rate_cad", input.buy_rate_cad)?;

        let equivalent_cad = sarafi_fx::convert(input.amount_irr, input.buy_rate_cad)?;
        let now = Utc::now();

        Ok(Self {
            id: RemittanceId::new(),
            tenant_id: input.tenant_id,
            branch_id: input.branch_id,
            sender_name: input.sender_name.trim().to_string(),
            recipient_name: input.recipient_name.trim().to_string(),
            recipient_account: input.recipient_account,
            buy_rate_cad: input.buy_rate_cad,
            equivalent_cad,
            balance: RemittanceBalance::new(input.amount_irr),
            notes: input.notes,
            created_by: actor,
            created_at: now,
            updated_at: now,
        })
    }
}

impl IncomingRemittance {
    /// Validate input and compute the CAD equivalent.
    pub fn create(input: NewIncomingRemittance, actor: UserId) -> Result<Self> {
        require_name("sender_name", &input.sender_name)?;
        require_name("recipient_name", &input.recipient_name)?;
        require_positive("amount_irr", input.amount_irr)?;
        require_whole_rials("amount_irr", input.amount_irr)?;
        require_positive("sell_rate_cad", input.sell_rate_cad)?;

        let equivalent_cad = sarafi_fx::convert(input.amount_irr, input.sell_rate_cad)?;
        let now = Utc::now();

        Ok(Self {
            id: RemittanceId::new(),
            tenant_id: input.tenant_id,
            branch_id: input.branch_id,
            sender_name: input.sender_name.trim().to_string(),
            recipient_name: input.recipient_name.trim().to_string(),
            sender_account: input.sender_account,
            sell_rate_cad: input.sell_rate_cad,
            equivalent_cad,
            balance: RemittanceBalance::new(input.amount_irr),
            notes: input.notes,
            created_by: actor,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn outgoing_input() -> NewOutgoingRemittance {
        NewOutgoingRemittance {
            tenant_id: TenantId::new(),
            branch_id: None,
            sender_name: " Sara Ahmadi ".to_string(),
            recipient_name: "Reza Karimi".to_string(),
            recipient_account: None,
            amount_irr: dec!(350000000),
            buy_rate_cad: dec!(50000),
            notes: None,
        }
    }

    #[test]
    fn test_outgoing_equivalent_uses_buy_rate() {
        let remittance = OutgoingRemittance::create(outgoing_input(), UserId::new()).unwrap();

        assert_eq!(remittance.equivalent_cad, dec!(7000));
        assert_eq!(remittance.balance.remaining_irr, dec!(350000000));
        assert_eq!(remittance.balance.status, RemittanceStatus::Open);
        assert_eq!(remittance.sender_name, "Sara Ahmadi");
    }

    #[test]
    fn test_outgoing_rejects_zero_rate() {
        let mut input = outgoing_input();
        input.buy_rate_cad = Decimal::ZERO;

        let err = OutgoingRemittance::create(input, UserId::new()).unwrap_err();
        assert!(matches!(err, SarafiError::Validation { field: Some(ref f), .. } if f == "buy_rate_cad"));
    }

    #[test]
    fn test_fractional_rials_rejected() {
        let mut input = outgoing_input();
        input.amount_irr = dec!(1000.5);

        let err = OutgoingRemittance::create(input, UserId::new()).unwrap_err();
        assert!(matches!(err, SarafiError::Validation { field: Some(ref f), .. } if f == "amount_irr"));

        let mut trailing_zero = outgoing_input();
        trailing_zero.amount_irr = dec!(1000.00);
        assert!(OutgoingRemittance::create(trailing_zero, UserId::new()).is_ok());
    }

    #[test]
    fn test_incoming_rejects_blank_sender() {
        let input = NewIncomingRemittance {
            tenant_id: TenantId::new(),
            branch_id: None,
            sender_name: "  ".to_string(),
            recipient_name: "Bureau".to_string(),
            sender_account: None,
            amount_irr: dec!(100000000),
            sell_rate_cad: dec!(52000),
            notes: None,
        };

        assert!(IncomingRemittance::create(input, UserId::new()).is_err());
    }

    #[test]
    fn test_filter_matching() {
        let branch = BranchId::new();
        let filter = RemittanceFilter {
            status: Some(RemittanceStatus::Open),
            branch_id: Some(branch),
        };

        assert!(filter.matches(RemittanceStatus::Open, Some(branch)));
        assert!(!filter.matches(RemittanceStatus::Open, None));
        assert!(!filter.matches(RemittanceStatus::Completed, Some(branch)));
        assert!(RemittanceFilter::default().matches(RemittanceStatus::Cancelled, None));
    }
}
