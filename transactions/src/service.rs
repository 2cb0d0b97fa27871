//! Transaction service: recording conversions and measuring their profit.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sarafi_common::{Currency, DateRange, Money, Result, SarafiError, TenantId, TransactionId, UserId};
use sarafi_fx::RateProvider;
use sarafi_payments::PaymentMethodService;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::store::TransactionStore;
use crate::transaction::{NewTransaction, ProfitStatus, Transaction};

/// Outcome of one pending-profit recalculation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalculationReport {
    pub examined: usize,
    pub calculated: usize,
    pub still_pending: usize,
}

/// Totals for one target currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrencyProfit {
    pub transaction_count: u64,
    pub pending_count: u64,
    pub total_profit: Decimal,
}

/// Transaction profit over a window, keyed by target currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionProfitSummary {
    pub by_currency: BTreeMap<Currency, CurrencyProfit>,
}

/// Records exchange transactions and keeps their profit current.
pub struct TransactionService {
    store: Arc<dyn TransactionStore>,
    rates: Arc<dyn RateProvider>,
    payment_methods: Option<Arc<PaymentMethodService>>,
}

impl TransactionService {
    pub fn new(store: Arc<dyn TransactionStore>, rates: Arc<dyn RateProvider>) -> Self {
        Self {
            store,
            rates,
            payment_methods: None,
        }
    }

    /// Validate payment methods and charge their fees on create.
    pub fn with_payment_methods(mut self, payment_methods: Arc<PaymentMethodService>) -> Self {
        self.payment_methods = Some(payment_methods);
        self
    }

    /// Record a transaction.
    ///
    /// A missing or non-positive market rate does not fail creation: the
    /// transaction is stored with pending profit for a later recalculation.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id))]
    pub async fn create(&self, input: NewTransaction, actor: UserId) -> Result<Transaction> {
        input.validate()?;

        let fee = match (input.payment_method, &self.payment_methods) {
            (Some(method), Some(payments)) => {
                payments
                    .validate_payment(input.tenant_id, input.branch_id, method, input.send_amount)
                    .await?;
                payments
                    .calculate_fee(input.tenant_id, input.branch_id, method, input.send_amount)
                    .await?
            }
            _ => Decimal::ZERO,
        };

        let receive = Money::new(
            sarafi_fx::apply_rate(input.send_amount, input.rate_applied)?,
            input.receive_currency.clone(),
        )
        .rounded();
        let now = Utc::now();

        let mut transaction = Transaction {
            id: TransactionId::new(),
            tenant_id: input.tenant_id,
            branch_id: input.branch_id,
            customer_id: input.customer_id,
            send: Money::new(input.send_amount, input.send_currency.clone()),
            receive,
            rate_applied: input.rate_applied,
            standard_rate: None,
            profit: Money::zero(input.receive_currency),
            fee: Money::new(fee, input.send_currency),
            payment_method: input.payment_method,
            profit_status: ProfitStatus::Pending,
            profit_calculated_at: None,
            profit_checked_at: None,
            created_by: actor,
            created_at: now,
            updated_at: now,
        };

        self.price(&mut transaction).await;

        self.store.insert(&transaction).await?;
        info!(
            transaction_id = %transaction.id,
            pair = %transaction.pair(),
            profit = %transaction.profit,
            profit_status = %transaction.profit_status,
            "Transaction recorded"
        );
        Ok(transaction)
    }

    /// Try to calculate profit now. Returns whether the transaction is priced.
    ///
    /// Neither a missing rate nor a rate the profit cannot be computed with
    /// is an error: the transaction stays pending for a later pass.
    async fn price(&self, transaction: &mut Transaction) -> bool {
        transaction.mark_checked();
        let Some(rate) = self.standard_rate(transaction).await else {
            return false;
        };
        match transaction.apply_standard_rate(rate) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    transaction_id = %transaction.id,
                    pair = %transaction.pair(),
                    rate = %rate,
                    error = %e,
                    "Profit calculation failed, profit pending"
                );
                false
            }
        }
    }

    /// Market rate for the transaction's pair, or `None` if there is no
    /// usable one right now.
    async fn standard_rate(&self, transaction: &Transaction) -> Option<Decimal> {
        let pair = transaction.pair();
        match self.rates.current_rate(transaction.tenant_id, &pair).await {
            Ok(rate) if rate.is_positive() => Some(rate.rate),
            Ok(rate) => {
                warn!(pair = %pair, rate = %rate.rate, "Non-positive standard rate, profit pending");
                None
            }
            Err(e) => {
                warn!(pair = %pair, error = %e, provider = self.rates.name(), "Rate lookup failed, profit pending");
                None
            }
        }
    }

    pub async fn get(&self, tenant_id: TenantId, id: TransactionId) -> Result<Transaction> {
        self.store
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| SarafiError::not_found("transaction", id))
    }

    /// Retry the rate lookup for up to `batch_size` pending transactions.
    #[instrument(skip(self))]
    pub async fn recalculate_pending(&self, batch_size: usize) -> Result<RecalculationReport> {
        let pending = self.store.list_pending(batch_size).await?;
        let mut report = RecalculationReport {
            examined: pending.len(),
            ..Default::default()
        };

        for mut transaction in pending {
            let priced = self.price(&mut transaction).await;
            self.store.update_profit(&transaction).await?;
            if priced {
                debug!(transaction_id = %transaction.id, profit = %transaction.profit, "Profit calculated");
                report.calculated += 1;
            } else {
                report.still_pending += 1;
            }
        }

        info!(
            examined = report.examined,
            calculated = report.calculated,
            still_pending = report.still_pending,
            "Pending profit recalculated"
        );
        Ok(report)
    }

    /// Transaction count, pending count and total profit per target currency.
    pub async fn profit_summary(&self, tenant_id: TenantId, range: &DateRange) -> Result<TransactionProfitSummary> {
        let mut summary = TransactionProfitSummary::default();
        for transaction in self.store.list_between(tenant_id, range).await? {
            let entry = summary
                .by_currency
                .entry(transaction.profit.currency.clone())
                .or_default();
            entry.transaction_count += 1;
            if transaction.is_pending() {
                entry.pending_count += 1;
            } else {
                entry.total_profit += transaction.profit.value;
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTransactionStore;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use sarafi_common::CurrencyPair;
    use sarafi_fx::{ExchangeRate, StaticRateProvider};
    use sarafi_payments::{
        FeeFormula, InMemoryPaymentMethodStore, NewPaymentMethodConfig, PaymentMethodType,
    };

    struct Fixture {
        service: TransactionService,
        rates: Arc<StaticRateProvider>,
        tenant: TenantId,
    }

    fn fixture() -> Fixture {
        let rates = Arc::new(StaticRateProvider::new("test"));
        let service = TransactionService::new(Arc::new(InMemoryTransactionStore::new()), rates.clone());
        Fixture {
            service,
            rates,
            tenant: TenantId::new(),
        }
    }

    fn cad_irr() -> CurrencyPair {
        CurrencyPair::new(Currency::cad(), Currency::irr())
    }

    fn input(tenant_id: TenantId, amount: Decimal, rate: Decimal) -> NewTransaction {
        NewTransaction {
            tenant_id,
            branch_id: None,
            customer_id: None,
            send_amount: amount,
            send_currency: Currency::cad(),
            receive_currency: Currency::irr(),
            rate_applied: rate,
            payment_method: None,
        }
    }

    #[tokio::test]
    async fn test_profit_calculated_when_rate_known() {
        let f = fixture();
        f.rates
            .set_rate(f.tenant, ExchangeRate::new(cad_irr(), dec!(52000), "test"));

        let tx = f
            .service
            .create(input(f.tenant, dec!(1000), dec!(51000)), UserId::new())
            .await
            .unwrap();

        assert_eq!(tx.profit_status, ProfitStatus::Calculated);
        assert_eq!(tx.receive.value, dec!(51000000));
        assert_eq!(tx.profit, Money::new(dec!(1000000), Currency::irr()));
        assert_eq!(tx.standard_rate, Some(dec!(52000)));
    }

    #[tokio::test]
    async fn test_missing_rate_falls_back_to_pending() {
        let f = fixture();
        let tx = f
            .service
            .create(input(f.tenant, dec!(1000), dec!(51000)), UserId::new())
            .await
            .unwrap();

        assert_eq!(tx.profit_status, ProfitStatus::Pending);
        assert!(tx.profit.is_zero());
        assert!(tx.standard_rate.is_none());
    }

    #[tokio::test]
    async fn test_zero_rate_falls_back_to_pending() {
        let f = fixture();
        f.rates
            .set_rate(f.tenant, ExchangeRate::new(cad_irr(), Decimal::ZERO, "test"));

        let tx = f
            .service
            .create(input(f.tenant, dec!(1000), dec!(51000)), UserId::new())
            .await
            .unwrap();
        assert!(tx.is_pending());
    }

    #[tokio::test]
    async fn test_invalid_input_rejected() {
        let f = fixture();
        let err = f
            .service
            .create(input(f.tenant, dec!(-5), dec!(51000)), UserId::new())
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_recalculate_pending() {
        let f = fixture();
        let actor = UserId::new();
        let first = f
            .service
            .create(input(f.tenant, dec!(100), dec!(51000)), actor)
            .await
            .unwrap();

        let eur = f
            .service
            .create(
                NewTransaction {
                    receive_currency: Currency::eur(),
                    rate_applied: dec!(0.67),
                    ..input(f.tenant, dec!(100), dec!(1))
                },
                actor,
            )
            .await
            .unwrap();

        let report = f.service.recalculate_pending(10).await.unwrap();
        assert_eq!(
            report,
            RecalculationReport {
                examined: 2,
                calculated: 0,
                still_pending: 2
            }
        );

        f.rates
            .set_rate(f.tenant, ExchangeRate::new(cad_irr(), dec!(52000), "test"));
        let report = f.service.recalculate_pending(10).await.unwrap();
        assert_eq!(report.calculated, 1);
        assert_eq!(report.still_pending, 1);

        let first = f.service.get(f.tenant, first.id).await.unwrap();
        assert_eq!(first.profit_status, ProfitStatus::Calculated);
        assert_eq!(first.profit.value, dec!(100000));
        assert!(f.service.get(f.tenant, eur.id).await.unwrap().is_pending());

        let report = f.service.recalculate_pending(10).await.unwrap();
        assert_eq!(report.examined, 1);
    }

    #[tokio::test]
    async fn test_unpriceable_rows_do_not_block_later_ones() {
        let f = fixture();
        let actor = UserId::new();
        for _ in 0..2 {
            f.service
                .create(
                    NewTransaction {
                        receive_currency: Currency::eur(),
                        rate_applied: dec!(0.67),
                        ..input(f.tenant, dec!(100), dec!(1))
                    },
                    actor,
                )
                .await
                .unwrap();
        }
        let irr = f
            .service
            .create(input(f.tenant, dec!(100), dec!(51000)), actor)
            .await
            .unwrap();
        assert!(irr.is_pending());

        f.rates
            .set_rate(f.tenant, ExchangeRate::new(cad_irr(), dec!(52000), "test"));

        let first = f.service.recalculate_pending(2).await.unwrap();
        assert_eq!(first.calculated, 0);
        assert_eq!(first.still_pending, 2);

        let second = f.service.recalculate_pending(2).await.unwrap();
        assert_eq!(second.calculated, 1);

        let irr = f.service.get(f.tenant, irr.id).await.unwrap();
        assert_eq!(irr.profit_status, ProfitStatus::Calculated);
        assert_eq!(irr.profit.value, dec!(100000));
    }

    #[tokio::test]
    async fn test_unusable_rate_degrades_to_pending() {
        let f = fixture();
        let actor = UserId::new();
        let cad_usd = CurrencyPair::new(Currency::cad(), Currency::usd());
        let usd_input = NewTransaction {
            receive_currency: Currency::usd(),
            rate_applied: dec!(0.73),
            ..input(f.tenant, dec!(1000), dec!(1))
        };

        let usd = f.service.create(usd_input.clone(), actor).await.unwrap();
        let irr = f
            .service
            .create(input(f.tenant, dec!(100), dec!(51000)), actor)
            .await
            .unwrap();

        // 1000 * 1e26 does not fit in a Decimal.
        f.rates.set_rate(
            f.tenant,
            ExchangeRate::new(cad_usd, dec!(100000000000000000000000000), "test"),
        );
        f.rates
            .set_rate(f.tenant, ExchangeRate::new(cad_irr(), dec!(52000), "test"));

        let created = f.service.create(usd_input, actor).await.unwrap();
        assert!(created.is_pending());
        assert!(created.profit.is_zero());

        let report = f.service.recalculate_pending(10).await.unwrap();
        assert_eq!(report.examined, 3);
        assert_eq!(report.calculated, 1);
        assert_eq!(report.still_pending, 2);

        assert!(f.service.get(f.tenant, usd.id).await.unwrap().is_pending());
        assert_eq!(
            f.service.get(f.tenant, irr.id).await.unwrap().profit_status,
            ProfitStatus::Calculated
        );
    }

    #[tokio::test]
    async fn test_payment_method_fee_and_bounds() {
        let payments = Arc::new(sarafi_payments::PaymentMethodService::new(Arc::new(
            InMemoryPaymentMethodStore::new(),
        )));
        let f = fixture();
        payments
            .create(NewPaymentMethodConfig {
                tenant_id: f.tenant,
                branch_id: None,
                method_type: PaymentMethodType::Card,
                display_name: "Card".to_string(),
                enabled: true,
                fee: FeeFormula::Percent { percent: dec!(2) },
                min_amount: None,
                max_amount: Some(dec!(5000)),
                sort_order: 0,
            })
            .await
            .unwrap();
        let service = f.service.with_payment_methods(payments);

        let mut by_card = input(f.tenant, dec!(1000), dec!(51000));
        by_card.payment_method = Some(PaymentMethodType::Card);
        let tx = service.create(by_card.clone(), UserId::new()).await.unwrap();
        assert_eq!(tx.fee, Money::new(dec!(20), Currency::cad()));

        by_card.send_amount = dec!(6000);
        assert!(service.create(by_card, UserId::new()).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_profit_summary_by_currency() {
        let f = fixture();
        let actor = UserId::new();
        f.rates
            .set_rate(f.tenant, ExchangeRate::new(cad_irr(), dec!(52000), "test"));

        f.service
            .create(input(f.tenant, dec!(100), dec!(51000)), actor)
            .await
            .unwrap();
        f.service
            .create(input(f.tenant, dec!(200), dec!(51500)), actor)
            .await
            .unwrap();
        f.service
            .create(
                NewTransaction {
                    receive_currency: Currency::usd(),
                    rate_applied: dec!(0.72),
                    ..input(f.tenant, dec!(50), dec!(1))
                },
                actor,
            )
            .await
            .unwrap();

        let now = Utc::now();
        let range = DateRange::new(now - Duration::hours(1), now + Duration::hours(1)).unwrap();
        let summary = f.service.profit_summary(f.tenant, &range).await.unwrap();

        let irr = &summary.by_currency[&Currency::irr()];
        assert_eq!(irr.transaction_count, 2);
        assert_eq!(irr.pending_count, 0);
        assert_eq!(irr.total_profit, dec!(200000));

        let usd = &summary.by_currency[&Currency::usd()];
        assert_eq!(usd.pending_count, 1);
        assert_eq!(usd.total_profit, Decimal::ZERO);
    }
}
