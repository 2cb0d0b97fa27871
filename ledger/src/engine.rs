//! Settlement engine.
//!
//! Remittances are only mutated through this type. A settlement reads both
//! rows, allocates on copies, and hands the result to the store as one
//! version-checked commit. A conflicting commit is re-read and retried.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sarafi_common::{DateRange, RemittanceId, Result, SarafiError, TenantId, UserId};
use tracing::{debug, info, instrument, warn};

use crate::remittance::{
    require_whole_rials, IncomingRemittance, NewIncomingRemittance, NewOutgoingRemittance, OutgoingRemittance,
    RemittanceFilter,
};
use crate::settlement::{ProfitSummary, RemittanceSettlement, SettlementCommit};
use crate::store::LedgerStore;

const OUTGOING: &str = "outgoing remittance";
const INCOMING: &str = "incoming remittance";

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Attempts made at committing one settlement before a conflict is
    /// returned to the caller.
    pub max_commit_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: 3,
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(attempts) = std::env::var("SARAFI_LEDGER_MAX_COMMIT_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse() {
                config.max_commit_attempts = attempts;
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_commit_attempts == 0 {
            return Err("Max commit attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Records remittances and settles them against each other.
pub struct SettlementEngine {
    store: Arc<dyn LedgerStore>,
    config: LedgerConfig,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    pub fn with_config(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Record a new outgoing remittance.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id))]
    pub async fn create_outgoing(&self, input: NewOutgoingRemittance, actor: UserId) -> Result<OutgoingRemittance> {
        let remittance = OutgoingRemittance::create(input, actor)?;
        self.store.insert_outgoing(&remittance).await?;

        info!(
            remittance_id = %remittance.id,
            amount_irr = %remittance.balance.amount_irr,
            equivalent_cad = %remittance.equivalent_cad,
            "Outgoing remittance recorded"
        );
        Ok(remittance)
    }

    /// Record a new incoming remittance.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id))]
    pub async fn create_incoming(&self, input: NewIncomingRemittance, actor: UserId) -> Result<IncomingRemittance> {
        let remittance = IncomingRemittance::create(input, actor)?;
        self.store.insert_incoming(&remittance).await?;

        info!(
            remittance_id = %remittance.id,
            amount_irr = %remittance.balance.amount_irr,
            equivalent_cad = %remittance.equivalent_cad,
            "Incoming remittance recorded"
        );
        Ok(remittance)
    }

    pub async fn get_outgoing(&self, tenant_id: TenantId, id: RemittanceId) -> Result<OutgoingRemittance> {
        self.store
            .get_outgoing(tenant_id, id)
            .await?
            .ok_or_else(|| SarafiError::not_found(OUTGOING, id))
    }

    pub async fn get_incoming(&self, tenant_id: TenantId, id: RemittanceId) -> Result<IncomingRemittance> {
        self.store
            .get_incoming(tenant_id, id)
            .await?
            .ok_or_else(|| SarafiError::not_found(INCOMING, id))
    }

    pub async fn list_outgoing(&self, tenant_id: TenantId, filter: &RemittanceFilter) -> Result<Vec<OutgoingRemittance>> {
        self.store.list_outgoing(tenant_id, filter).await
    }

    pub async fn list_incoming(&self, tenant_id: TenantId, filter: &RemittanceFilter) -> Result<Vec<IncomingRemittance>> {
        self.store.list_incoming(tenant_id, filter).await
    }

    /// Cancel an outgoing remittance that has not been settled at all.
    #[instrument(skip(self))]
    pub async fn cancel_outgoing(&self, tenant_id: TenantId, id: RemittanceId) -> Result<OutgoingRemittance> {
        let mut remittance = self.get_outgoing(tenant_id, id).await?;
        let expected_version = remittance.balance.version;

        remittance.balance.cancel()?;
        remittance.updated_at = Utc::now();
        self.store.update_outgoing(&remittance, expected_version).await?;

        info!(remittance_id = %id, "Outgoing remittance cancelled");
        Ok(remittance)
    }

    /// Cancel an incoming remittance that has not been settled at all.
    #[instrument(skip(self))]
    pub async fn cancel_incoming(&self, tenant_id: TenantId, id: RemittanceId) -> Result<IncomingRemittance> {
        let mut remittance = self.get_incoming(tenant_id, id).await?;
        let expected_version = remittance.balance.version;

        remittance.balance.cancel()?;
        remittance.updated_at = Utc::now();
        self.store.update_incoming(&remittance, expected_version).await?;

        info!(remittance_id = %id, "Incoming remittance cancelled");
        Ok(remittance)
    }

    /// Allocate `amount_irr` of `incoming_id` to `outgoing_id`.
    ///
    /// Both balances shrink by the amount and the settlement records
    /// `amount/buy - amount/sell` as profit in CAD. Either side reaching a
    /// zero remaining balance becomes completed.
    #[instrument(skip(self))]
    pub async fn settle(
        &self,
        tenant_id: TenantId,
        outgoing_id: RemittanceId,
        incoming_id: RemittanceId,
        amount_irr: Decimal,
        actor: UserId,
    ) -> Result<RemittanceSettlement> {
        if amount_irr <= Decimal::ZERO {
            return Err(SarafiError::invalid_field("amount_irr", "settlement amount must be positive"));
        }
        require_whole_rials("amount_irr", amount_irr)?;

        let mut attempt = 1;
        loop {
            let commit = self
                .prepare_settlement(tenant_id, outgoing_id, incoming_id, amount_irr, actor)
                .await?;

            match self.store.commit_settlement(&commit).await {
                Ok(()) => {
                    let settlement = commit.settlement;
                    info!(
                        settlement_id = %settlement.id,
                        amount_irr = %settlement.amount_irr,
                        profit_cad = %settlement.profit_cad,
                        outgoing_status = %commit.outgoing.balance.status,
                        incoming_status = %commit.incoming.balance.status,
                        attempt,
                        "Settlement recorded"
                    );
                    return Ok(settlement);
                }
                Err(SarafiError::Conflict(reason)) if attempt < self.config.max_commit_attempts => {
                    warn!(attempt, %reason, "Settlement commit conflicted, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn prepare_settlement(
        &self,
        tenant_id: TenantId,
        outgoing_id: RemittanceId,
        incoming_id: RemittanceId,
        amount_irr: Decimal,
        actor: UserId,
    ) -> Result<SettlementCommit> {
        let mut outgoing = self.get_outgoing(tenant_id, outgoing_id).await?;
        let mut incoming = self.get_incoming(tenant_id, incoming_id).await?;
        let outgoing_version = outgoing.balance.version;
        let incoming_version = incoming.balance.version;

        let profit_cad = sarafi_fx::spread_profit(amount_irr, outgoing.buy_rate_cad, incoming.sell_rate_cad)?;

        outgoing.balance.allocate(OUTGOING, amount_irr, profit_cad)?;
        incoming.balance.allocate(INCOMING, amount_irr, profit_cad)?;

        let now = Utc::now();
        outgoing.updated_at = now;
        incoming.updated_at = now;

        debug!(
            outgoing_remaining = %outgoing.balance.remaining_irr,
            incoming_remaining = %incoming.balance.remaining_irr,
            "Settlement prepared"
        );

        Ok(SettlementCommit {
            settlement: RemittanceSettlement::new(&outgoing, &incoming, amount_irr, profit_cad, actor),
            outgoing,
            outgoing_version,
            incoming,
            incoming_version,
        })
    }

    /// Settlements touching an outgoing remittance, oldest first.
    pub async fn settlements_for_outgoing(&self, tenant_id: TenantId, id: RemittanceId) -> Result<Vec<RemittanceSettlement>> {
        self.get_outgoing(tenant_id, id).await?;
        self.store.settlements_for_outgoing(tenant_id, id).await
    }

    /// Settlements drawing on an incoming remittance, oldest first.
    pub async fn settlements_for_incoming(&self, tenant_id: TenantId, id: RemittanceId) -> Result<Vec<RemittanceSettlement>> {
        self.get_incoming(tenant_id, id).await?;
        self.store.settlements_for_incoming(tenant_id, id).await
    }

    /// Count, total and average settlement profit inside `range`.
    #[instrument(skip(self))]
    pub async fn profit_summary(&self, tenant_id: TenantId, range: &DateRange) -> Result<ProfitSummary> {
        self.store.profit_summary(tenant_id, range).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::RemittanceStatus;
    use crate::memory::InMemoryLedgerStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn outgoing_input(tenant_id: TenantId, amount: Decimal) -> NewOutgoingRemittance {
        NewOutgoingRemittance {
            tenant_id,
            branch_id: None,
            sender_name: "Sara Ahmadi".to_string(),
            recipient_name: "Reza Karimi".to_string(),
            recipient_account: Some("IR000000000000000000000001".to_string()),
            amount_irr: amount,
            buy_rate_cad: dec!(50000),
            notes: None,
        }
    }

    fn incoming_input(tenant_id: TenantId, amount: Decimal) -> NewIncomingRemittance {
        NewIncomingRemittance {
            tenant_id,
            branch_id: None,
            sender_name: "Tehran Exchange".to_string(),
            recipient_name: "Bureau".to_string(),
            sender_account: None,
            amount_irr: amount,
            sell_rate_cad: dec!(52000),
            notes: None,
        }
    }

    async fn pair(
        engine: &SettlementEngine,
        tenant_id: TenantId,
        outgoing: Decimal,
        incoming: Decimal,
    ) -> (OutgoingRemittance, IncomingRemittance) {
        let actor = UserId::new();
        let out = engine.create_outgoing(outgoing_input(tenant_id, outgoing), actor).await.unwrap();
        let inc = engine.create_incoming(incoming_input(tenant_id, incoming), actor).await.unwrap();
        (out, inc)
    }

    fn engine() -> SettlementEngine {
        SettlementEngine::new(Arc::new(InMemoryLedgerStore::new()))
    }

    #[tokio::test]
    async fn test_partial_settlements_complete_outgoing() {
        let engine = engine();
        let tenant = TenantId::new();
        let actor = UserId::new();
        let (out, inc) = pair(&engine, tenant, dec!(350000000), dec!(400000000)).await;

        for amount in [dec!(120000000), dec!(150000000), dec!(50000000), dec!(30000000)] {
            engine.settle(tenant, out.id, inc.id, amount, actor).await.unwrap();
        }

        let out = engine.get_outgoing(tenant, out.id).await.unwrap();
        assert_eq!(out.balance.remaining_irr, Decimal::ZERO);
        assert_eq!(out.balance.settled_irr, dec!(350000000));
        assert_eq!(out.balance.status, RemittanceStatus::Completed);
        assert!(out.balance.is_consistent());

        let inc = engine.get_incoming(tenant, inc.id).await.unwrap();
        assert_eq!(inc.balance.remaining_irr, dec!(50000000));
        assert_eq!(inc.balance.status, RemittanceStatus::PartiallySettled);

        let expected = dec!(350000000) / dec!(50000) - dec!(350000000) / dec!(52000);
        let drift = (out.balance.total_profit_cad - expected).abs();
        assert!(drift < dec!(0.000001), "profit drifted by {}", drift);

        let settlements = engine.settlements_for_outgoing(tenant, out.id).await.unwrap();
        assert_eq!(settlements.len(), 4);
        assert_eq!(settlements[0].amount_irr, dec!(120000000));
        let summed: Decimal = settlements.iter().map(|s| s.profit_cad).sum();
        assert_eq!(summed, out.balance.total_profit_cad);
    }

    #[tokio::test]
    async fn test_over_allocation_rejected() {
        let engine = engine();
        let tenant = TenantId::new();
        let (out, inc) = pair(&engine, tenant, dec!(100000000), dec!(60000000)).await;

        let err = engine
            .settle(tenant, out.id, inc.id, dec!(70000000), UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SarafiError::InsufficientBalance { entity, .. } if entity == INCOMING));

        let out = engine.get_outgoing(tenant, out.id).await.unwrap();
        assert_eq!(out.balance.remaining_irr, dec!(100000000));
        assert_eq!(out.balance.status, RemittanceStatus::Open);
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected() {
        let engine = engine();
        let tenant = TenantId::new();
        let (out, inc) = pair(&engine, tenant, dec!(1000), dec!(1000)).await;

        let err = engine
            .settle(tenant, out.id, inc.id, Decimal::ZERO, UserId::new())
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_fractional_settlement_rejected() {
        let engine = engine();
        let tenant = TenantId::new();
        let (out, inc) = pair(&engine, tenant, dec!(1000), dec!(1000)).await;

        let err = engine
            .settle(tenant, out.id, inc.id, dec!(0.4), UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SarafiError::Validation { field: Some(ref f), .. } if f == "amount_irr"));

        let out = engine.get_outgoing(tenant, out.id).await.unwrap();
        assert_eq!(out.balance.remaining_irr, dec!(1000));
        assert_eq!(out.balance.version, 0);
    }

    #[tokio::test]
    async fn test_other_tenant_is_not_found() {
        let engine = engine();
        let tenant = TenantId::new();
        let (out, inc) = pair(&engine, tenant, dec!(1000), dec!(1000)).await;

        let err = engine
            .settle(TenantId::new(), out.id, inc.id, dec!(10), UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SarafiError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_completed_remittance_rejects_settlement() {
        let engine = engine();
        let tenant = TenantId::new();
        let actor = UserId::new();
        let (out, inc) = pair(&engine, tenant, dec!(1000), dec!(5000)).await;

        engine.settle(tenant, out.id, inc.id, dec!(1000), actor).await.unwrap();
        let err = engine.settle(tenant, out.id, inc.id, dec!(1), actor).await.unwrap_err();
        assert!(matches!(err, SarafiError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_cancel_blocks_settlement() {
        let engine = engine();
        let tenant = TenantId::new();
        let (out, inc) = pair(&engine, tenant, dec!(1000), dec!(1000)).await;

        let cancelled = engine.cancel_incoming(tenant, inc.id).await.unwrap();
        assert_eq!(cancelled.balance.status, RemittanceStatus::Cancelled);

        assert!(engine
            .settle(tenant, out.id, inc.id, dec!(10), UserId::new())
            .await
            .is_err());
        assert!(engine.cancel_incoming(tenant, inc.id).await.is_err());
    }

    #[tokio::test]
    async fn test_profit_summary_over_range() {
        let engine = engine();
        let tenant = TenantId::new();
        let actor = UserId::new();
        let (out, inc) = pair(&engine, tenant, dec!(350000000), dec!(350000000)).await;

        engine.settle(tenant, out.id, inc.id, dec!(100000000), actor).await.unwrap();
        engine.settle(tenant, out.id, inc.id, dec!(250000000), actor).await.unwrap();

        let now = Utc::now();
        let range = DateRange::new(now - Duration::hours(1), now + Duration::hours(1)).unwrap();
        let summary = engine.profit_summary(tenant, &range).await.unwrap();
        assert_eq!(summary.settlement_count, 2);
        assert_eq!(summary.total_settled_irr, dec!(350000000));
        assert!(summary.total_profit_cad > Decimal::ZERO);

        let earlier = DateRange::new(now - Duration::days(2), now - Duration::days(1)).unwrap();
        let empty = engine.profit_summary(tenant, &earlier).await.unwrap();
        assert_eq!(empty.settlement_count, 0);
        assert_eq!(empty.average_profit_cad, Decimal::ZERO);

        let other = engine.profit_summary(TenantId::new(), &range).await.unwrap();
        assert_eq!(other.settlement_count, 0);
    }

    /// Fails the first `conflicts` commits, then delegates.
    struct ConflictingStore {
        inner: InMemoryLedgerStore,
        conflicts: AtomicU32,
    }

    impl ConflictingStore {
        fn new(conflicts: u32) -> Self {
            Self {
                inner: InMemoryLedgerStore::new(),
                conflicts: AtomicU32::new(conflicts),
            }
        }
    }

    #[async_trait]
    impl LedgerStore for ConflictingStore {
        async fn insert_outgoing(&self, r: &OutgoingRemittance) -> Result<()> {
            self.inner.insert_outgoing(r).await
        }
        async fn insert_incoming(&self, r: &IncomingRemittance) -> Result<()> {
            self.inner.insert_incoming(r).await
        }
        async fn get_outgoing(&self, t: TenantId, id: RemittanceId) -> Result<Option<OutgoingRemittance>> {
            self.inner.get_outgoing(t, id).await
        }
        async fn get_incoming(&self, t: TenantId, id: RemittanceId) -> Result<Option<IncomingRemittance>> {
            self.inner.get_incoming(t, id).await
        }
        async fn list_outgoing(&self, t: TenantId, f: &RemittanceFilter) -> Result<Vec<OutgoingRemittance>> {
            self.inner.list_outgoing(t, f).await
        }
        async fn list_incoming(&self, t: TenantId, f: &RemittanceFilter) -> Result<Vec<IncomingRemittance>> {
            self.inner.list_incoming(t, f).await
        }
        async fn update_outgoing(&self, r: &OutgoingRemittance, v: i64) -> Result<()> {
            self.inner.update_outgoing(r, v).await
        }
        async fn update_incoming(&self, r: &IncomingRemittance, v: i64) -> Result<()> {
            self.inner.update_incoming(r, v).await
        }
        async fn commit_settlement(&self, commit: &SettlementCommit) -> Result<()> {
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Err(SarafiError::Conflict("injected".to_string()));
            }
            self.inner.commit_settlement(commit).await
        }
        async fn settlements_for_outgoing(&self, t: TenantId, id: RemittanceId) -> Result<Vec<RemittanceSettlement>> {
            self.inner.settlements_for_outgoing(t, id).await
        }
        async fn settlements_for_incoming(&self, t: TenantId, id: RemittanceId) -> Result<Vec<RemittanceSettlement>> {
            self.inner.settlements_for_incoming(t, id).await
        }
        async fn settlements_between(&self, t: TenantId, r: &DateRange) -> Result<Vec<RemittanceSettlement>> {
            self.inner.settlements_between(t, r).await
        }
    }

    #[tokio::test]
    async fn test_conflict_is_retried() {
        let engine = SettlementEngine::new(Arc::new(ConflictingStore::new(2)));
        let tenant = TenantId::new();
        let (out, inc) = pair(&engine, tenant, dec!(1000), dec!(1000)).await;

        engine.settle(tenant, out.id, inc.id, dec!(400), UserId::new()).await.unwrap();

        let out = engine.get_outgoing(tenant, out.id).await.unwrap();
        assert_eq!(out.balance.settled_irr, dec!(400));
        assert_eq!(out.balance.version, 1);
    }

    #[tokio::test]
    async fn test_conflict_surfaces_after_max_attempts() {
        let engine = SettlementEngine::with_config(
            Arc::new(ConflictingStore::new(5)),
            LedgerConfig {
                max_commit_attempts: 3,
            },
        );
        let tenant = TenantId::new();
        let (out, inc) = pair(&engine, tenant, dec!(1000), dec!(1000)).await;

        let err = engine
            .settle(tenant, out.id, inc.id, dec!(400), UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SarafiError::Conflict(_)));

        let out = engine.get_outgoing(tenant, out.id).await.unwrap();
        assert_eq!(out.balance.settled_irr, Decimal::ZERO);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_settlements_never_over_allocate() {
        let engine = Arc::new(SettlementEngine::with_config(
            Arc::new(InMemoryLedgerStore::new()),
            LedgerConfig {
                max_commit_attempts: 50,
            },
        ));
        let tenant = TenantId::new();
        let (out, inc) = pair(&engine, tenant, dec!(500), dec!(1000)).await;
        let (out_id, inc_id) = (out.id, inc.id);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.settle(tenant, out_id, inc_id, dec!(100), UserId::new()).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        let out = engine.get_outgoing(tenant, out_id).await.unwrap();
        assert_eq!(succeeded, 5);
        assert_eq!(out.balance.settled_irr, dec!(500));
        assert_eq!(out.balance.status, RemittanceStatus::Completed);
        assert_eq!(engine.settlements_for_outgoing(tenant, out.id).await.unwrap().len(), 5);
    }

    #[test]
    fn test_config_validation() {
        assert!(LedgerConfig::default().validate().is_ok());
        assert!(LedgerConfig {
            max_commit_attempts: 0
        }
        .validate()
        .is_err());
    }

    proptest! {
        #[test]
        fn prop_settled_never_exceeds_amount(amounts in prop::collection::vec(1u32..400, 1..20)) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let engine = engine();
                let tenant = TenantId::new();
                let actor = UserId::new();
                let (out, inc) = pair(&engine, tenant, dec!(1000), dec!(100000)).await;

                for amount in &amounts {
                    let _ = engine.settle(tenant, out.id, inc.id, Decimal::from(*amount), actor).await;
                }

                let out = engine.get_outgoing(tenant, out.id).await.unwrap();
                let settled: Decimal = engine
                    .settlements_for_outgoing(tenant, out.id)
                    .await
                    .unwrap()
                    .iter()
                    .map(|s| s.amount_irr)
                    .sum();

                assert!(settled <= dec!(1000));
                assert_eq!(settled, out.balance.settled_irr);
                assert!(out.balance.is_consistent());
                assert_eq!(settled == dec!(1000), out.balance.status == RemittanceStatus::Completed);
            });
        }
    }
}
