//! Settlement records and profit reporting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sarafi_common::{RemittanceId, SettlementId, TenantId, UserId};
use serde::{Deserialize, Serialize};

use crate::remittance::{IncomingRemittance, OutgoingRemittance};

/// An allocation of IRR from one incoming remittance to one outgoing
/// remittance. Append-only: never updated after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemittanceSettlement {
    pub id: SettlementId,
    pub tenant_id: TenantId,
    pub outgoing_id: RemittanceId,
    pub incoming_id: RemittanceId,
    /// IRR allocated.
    pub amount_irr: Decimal,
    /// Outgoing side's buy rate at settlement time.
    pub buy_rate_cad: Decimal,
    /// Incoming side's sell rate at settlement time.
    pub sell_rate_cad: Decimal,
    /// `amount/buy - amount/sell`.
    pub profit_cad: Decimal,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl RemittanceSettlement {
    pub fn new(
        outgoing: &OutgoingRemittance,
        incoming: &IncomingRemittance,
        amount_irr: Decimal,
        profit_cad: Decimal,
        actor: UserId,
    ) -> Self {
        Self {
            id: SettlementId::new(),
            tenant_id: outgoing.tenant_id,
            outgoing_id: outgoing.id,
            incoming_id: incoming.id,
            amount_irr,
            buy_rate_cad: outgoing.buy_rate_cad,
            sell_rate_cad: incoming.sell_rate_cad,
            profit_cad,
            created_by: actor,
            created_at: Utc::now(),
        }
    }
}

/// Everything a store must write atomically for one settlement.
///
/// The `*_version` fields carry the versions read before the balances were
/// mutated; the store rejects the commit with a conflict if either row has
/// moved on since.
#[derive(Debug, Clone)]
pub struct SettlementCommit {
    pub settlement: RemittanceSettlement,
    pub outgoing: OutgoingRemittance,
    pub outgoing_version: i64,
    pub incoming: IncomingRemittance,
    pub incoming_version: i64,
}

/// Aggregated settlement profit over a reporting window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitSummary {
    pub settlement_count: u64,
    pub total_settled_irr: Decimal,
    pub total_profit_cad: Decimal,
    pub average_profit_cad: Decimal,
}

impl ProfitSummary {
    /// Build from raw totals.
    pub fn from_totals(settlement_count: u64, total_settled_irr: Decimal, total_profit_cad: Decimal) -> Self {
        let average_profit_cad = if settlement_count == 0 {
            Decimal::ZERO
        } else {
            (total_profit_cad / Decimal::from(settlement_count))
                .round_dp(sarafi_fx::CONVERSION_SCALE)
        };
        Self {
            settlement_count,
            total_settled_irr,
            total_profit_cad,
            average_profit_cad,
        }
    }

    /// Summarise a slice of settlements.
    pub fn from_settlements(settlements: &[RemittanceSettlement]) -> Self {
        let total_settled_irr = settlements.iter().map(|s| s.amount_irr).sum();
        let total_profit_cad = settlements.iter().map(|s| s.profit_cad).sum();
        Self::from_totals(settlements.len() as u64, total_settled_irr, total_profit_cad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn settlement(amount: Decimal, profit: Decimal) -> RemittanceSettlement {
        RemittanceSettlement {
            id: SettlementId::new(),
            tenant_id: TenantId::new(),
            outgoing_id: RemittanceId::new(),
            incoming_id: RemittanceId::new(),
            amount_irr: amount,
            buy_rate_cad: dec!(50000),
            sell_rate_cad: dec!(52000),
            profit_cad: profit,
            created_by: UserId::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_summary_of_nothing_is_zero() {
        let summary = ProfitSummary::from_settlements(&[]);
        assert_eq!(summary.settlement_count, 0);
        assert_eq!(summary.total_profit_cad, Decimal::ZERO);
        assert_eq!(summary.average_profit_cad, Decimal::ZERO);
    }

    #[test]
    fn test_summary_average() {
        let summary = ProfitSummary::from_settlements(&[
            settlement(dec!(100000000), dec!(10)),
            settlement(dec!(50000000), dec!(5)),
            settlement(dec!(50000000), dec!(5)),
        ]);
        assert_eq!(summary.settlement_count, 3);
        assert_eq!(summary.total_settled_irr, dec!(200000000));
        assert_eq!(summary.total_profit_cad, dec!(20));
        assert_eq!(summary.average_profit_cad, dec!(6.6666666667));
    }
}
