//! In-memory ledger store.

use async_trait::async_trait;
use parking_lot::RwLock;
use sarafi_common::{DateRange, RemittanceId, Result, SarafiError, TenantId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::remittance::{IncomingRemittance, OutgoingRemittance, RemittanceFilter};
use crate::settlement::{RemittanceSettlement, SettlementCommit};
use crate::store::LedgerStore;

#[derive(Default)]
struct Tables {
    outgoing: HashMap<RemittanceId, OutgoingRemittance>,
    incoming: HashMap<RemittanceId, IncomingRemittance>,
    settlements: Vec<RemittanceSettlement>,
}

/// A thread-safe in-memory ledger.
///
/// All tables sit behind one lock, so `commit_settlement` checks both row
/// versions and applies all three writes without any other writer observing
/// a partial state.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_version(entity: &'static str, id: RemittanceId, stored: i64, expected: i64) -> Result<()> {
    if stored != expected {
        return Err(SarafiError::Conflict(format!(
            "{} {} changed concurrently (version {} != {})",
            entity, id, stored, expected
        )));
    }
    Ok(())
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_outgoing(&self, remittance: &OutgoingRemittance) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.outgoing.contains_key(&remittance.id) {
            return Err(SarafiError::Conflict(format!("outgoing remittance {} exists", remittance.id)));
        }
        tables.outgoing.insert(remittance.id, remittance.clone());
        Ok(())
    }

    async fn insert_incoming(&self, remittance: &IncomingRemittance) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.incoming.contains_key(&remittance.id) {
            return Err(SarafiError::Conflict(format!("incoming remittance {} exists", remittance.id)));
        }
        tables.incoming.insert(remittance.id, remittance.clone());
        Ok(())
    }

    async fn get_outgoing(&self, tenant_id: TenantId, id: RemittanceId) -> Result<Option<OutgoingRemittance>> {
        let tables = self.tables.read();
        Ok(tables
            .outgoing
            .get(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned())
    }

    async fn get_incoming(&self, tenant_id: TenantId, id: RemittanceId) -> Result<Option<IncomingRemittance>> {
        let tables = self.tables.read();
        Ok(tables
            .incoming
            .get(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_outgoing(&self, tenant_id: TenantId, filter: &RemittanceFilter) -> Result<Vec<OutgoingRemittance>> {
        let tables = self.tables.read();
        let mut rows: Vec<OutgoingRemittance> = tables
            .outgoing
            .values()
            .filter(|r| r.tenant_id == tenant_id && filter.matches(r.balance.status, r.branch_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn list_incoming(&self, tenant_id: TenantId, filter: &RemittanceFilter) -> Result<Vec<IncomingRemittance>> {
        let tables = self.tables.read();
        let mut rows: Vec<IncomingRemittance> = tables
            .incoming
            .values()
            .filter(|r| r.tenant_id == tenant_id && filter.matches(r.balance.status, r.branch_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn update_outgoing(&self, remittance: &OutgoingRemittance, expected_version: i64) -> Result<()> {
        let mut tables = self.tables.write();
        let stored = tables
            .outgoing
            .get_mut(&remittance.id)
            .filter(|r| r.tenant_id == remittance.tenant_id)
            .ok_or_else(|| SarafiError::not_found("outgoing remittance", remittance.id))?;
        check_version("outgoing remittance", remittance.id, stored.balance.version, expected_version)?;
        *stored = remittance.clone();
        Ok(())
    }

    async fn update_incoming(&self, remittance: &IncomingRemittance, expected_version: i64) -> Result<()> {
        let mut tables = self.tables.write();
        let stored = tables
            .incoming
            .get_mut(&remittance.id)
            .filter(|r| r.tenant_id == remittance.tenant_id)
            .ok_or_else(|| SarafiError::not_found("incoming remittance", remittance.id))?;
        check_version("incoming remittance", remittance.id, stored.balance.version, expected_version)?;
        *stored = remittance.clone();
        Ok(())
    }

    async fn commit_settlement(&self, commit: &SettlementCommit) -> Result<()> {
        let mut tables = self.tables.write();
        let tenant_id = commit.settlement.tenant_id;

        let outgoing_version = tables
            .outgoing
            .get(&commit.outgoing.id)
            .filter(|r| r.tenant_id == tenant_id)
            .map(|r| r.balance.version)
            .ok_or_else(|| SarafiError::not_found("outgoing remittance", commit.outgoing.id))?;
        let incoming_version = tables
            .incoming
            .get(&commit.incoming.id)
            .filter(|r| r.tenant_id == tenant_id)
            .map(|r| r.balance.version)
            .ok_or_else(|| SarafiError::not_found("incoming remittance", commit.incoming.id))?;

        check_version("outgoing remittance", commit.outgoing.id, outgoing_version, commit.outgoing_version)?;
        check_version("incoming remittance", commit.incoming.id, incoming_version, commit.incoming_version)?;

        tables.outgoing.insert(commit.outgoing.id, commit.outgoing.clone());
        tables.incoming.insert(commit.incoming.id, commit.incoming.clone());
        tables.settlements.push(commit.settlement.clone());
        Ok(())
    }

    async fn settlements_for_outgoing(&self, tenant_id: TenantId, id: RemittanceId) -> Result<Vec<RemittanceSettlement>> {
        let tables = self.tables.read();
        Ok(tables
            .settlements
            .iter()
            .filter(|s| s.tenant_id == tenant_id && s.outgoing_id == id)
            .cloned()
            .collect())
    }

    async fn settlements_for_incoming(&self, tenant_id: TenantId, id: RemittanceId) -> Result<Vec<RemittanceSettlement>> {
        let tables = self.tables.read();
        Ok(tables
            .settlements
            .iter()
            .filter(|s| s.tenant_id == tenant_id && s.incoming_id == id)
            .cloned()
            .collect())
    }

    async fn settlements_between(&self, tenant_id: TenantId, range: &DateRange) -> Result<Vec<RemittanceSettlement>> {
        let tables = self.tables.read();
        Ok(tables
            .settlements
            .iter()
            .filter(|s| s.tenant_id == tenant_id && range.contains(s.created_at))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remittance::NewOutgoingRemittance;
    use rust_decimal_macros::dec;
    use sarafi_common::UserId;

    fn outgoing(tenant_id: TenantId) -> OutgoingRemittance {
        OutgoingRemittance::create(
            NewOutgoingRemittance {
                tenant_id,
                branch_id: None,
                sender_name: "Sara".to_string(),
                recipient_name: "Reza".to_string(),
                recipient_account: None,
                amount_irr: dec!(1000000),
                buy_rate_cad: dec!(50000),
                notes: None,
            },
            UserId::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_is_tenant_scoped() {
        let store = InMemoryLedgerStore::new();
        let tenant = TenantId::new();
        let remittance = outgoing(tenant);
        store.insert_outgoing(&remittance).await.unwrap();

        assert!(store.get_outgoing(tenant, remittance.id).await.unwrap().is_some());
        assert!(store
            .get_outgoing(TenantId::new(), remittance.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = InMemoryLedgerStore::new();
        let tenant = TenantId::new();
        let mut remittance = outgoing(tenant);
        store.insert_outgoing(&remittance).await.unwrap();

        remittance.balance.cancel().unwrap();
        store.update_outgoing(&remittance, 0).await.unwrap();

        let err = store.update_outgoing(&remittance, 0).await.unwrap_err();
        assert!(matches!(err, SarafiError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let store = InMemoryLedgerStore::new();
        let remittance = outgoing(TenantId::new());
        store.insert_outgoing(&remittance).await.unwrap();

        assert!(store.insert_outgoing(&remittance).await.is_err());
    }
}
