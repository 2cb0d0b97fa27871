//! Storage port for the remittance ledger.

use async_trait::async_trait;
use sarafi_common::{DateRange, RemittanceId, Result, TenantId};

use crate::remittance::{IncomingRemittance, OutgoingRemittance, RemittanceFilter};
use crate::settlement::{ProfitSummary, RemittanceSettlement, SettlementCommit};

/// Tenant-scoped persistence for remittances and settlements.
///
/// Every read takes the tenant; a row owned by another tenant is reported as
/// absent, never returned.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_outgoing(&self, remittance: &OutgoingRemittance) -> Result<()>;

    async fn insert_incoming(&self, remittance: &IncomingRemittance) -> Result<()>;

    async fn get_outgoing(&self, tenant_id: TenantId, id: RemittanceId) -> Result<Option<OutgoingRemittance>>;

    async fn get_incoming(&self, tenant_id: TenantId, id: RemittanceId) -> Result<Option<IncomingRemittance>>;

    /// Newest first.
    async fn list_outgoing(&self, tenant_id: TenantId, filter: &RemittanceFilter) -> Result<Vec<OutgoingRemittance>>;

    /// Newest first.
    async fn list_incoming(&self, tenant_id: TenantId, filter: &RemittanceFilter) -> Result<Vec<IncomingRemittance>>;

    /// Overwrite a remittance if its stored version still equals
    /// `expected_version`; otherwise fail with `SarafiError::Conflict`.
    async fn update_outgoing(&self, remittance: &OutgoingRemittance, expected_version: i64) -> Result<()>;

    /// See [`LedgerStore::update_outgoing`].
    async fn update_incoming(&self, remittance: &IncomingRemittance, expected_version: i64) -> Result<()>;

    /// Write both balances and the settlement as one unit, with the same
    /// version check as the update methods on both rows.
    async fn commit_settlement(&self, commit: &SettlementCommit) -> Result<()>;

    /// Oldest first.
    async fn settlements_for_outgoing(&self, tenant_id: TenantId, id: RemittanceId) -> Result<Vec<RemittanceSettlement>>;

    /// Oldest first.
    async fn settlements_for_incoming(&self, tenant_id: TenantId, id: RemittanceId) -> Result<Vec<RemittanceSettlement>>;

    async fn settlements_between(&self, tenant_id: TenantId, range: &DateRange) -> Result<Vec<RemittanceSettlement>>;

    /// Aggregate settlements created inside `range`.
    async fn profit_summary(&self, tenant_id: TenantId, range: &DateRange) -> Result<ProfitSummary> {
        let settlements = self.settlements_between(tenant_id, range).await?;
        Ok(ProfitSummary::from_settlements(&settlements))
    }
}
