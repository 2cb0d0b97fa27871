//! In-memory transaction store.

use async_trait::async_trait;
use parking_lot::RwLock;
use sarafi_common::{DateRange, Result, SarafiError, TenantId, TransactionId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::store::TransactionStore;
use crate::transaction::Transaction;

#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn oldest_first(rows: &mut [Transaction]) {
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, transaction: &Transaction) -> Result<()> {
        let mut transactions = self.transactions.write();
        if transactions.contains_key(&transaction.id) {
            return Err(SarafiError::Conflict(format!("transaction {} exists", transaction.id)));
        }
        transactions.insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn get(&self, tenant_id: TenantId, id: TransactionId) -> Result<Option<Transaction>> {
        Ok(self
            .transactions
            .read()
            .get(&id)
            .filter(|t| t.tenant_id == tenant_id)
            .cloned())
    }

    async fn update_profit(&self, transaction: &Transaction) -> Result<()> {
        let mut transactions = self.transactions.write();
        let stored = transactions
            .get_mut(&transaction.id)
            .filter(|t| t.tenant_id == transaction.tenant_id)
            .ok_or_else(|| SarafiError::not_found("transaction", transaction.id))?;

        stored.standard_rate = transaction.standard_rate;
        stored.profit = transaction.profit.clone();
        stored.profit_status = transaction.profit_status;
        stored.profit_calculated_at = transaction.profit_calculated_at;
        stored.profit_checked_at = transaction.profit_checked_at;
        stored.updated_at = transaction.updated_at;
        Ok(())
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<Transaction>> {
        let mut rows: Vec<Transaction> = self
            .transactions
            .read()
            .values()
            .filter(|t| t.is_pending())
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.profit_checked_at
                .cmp(&b.profit_checked_at)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn list_between(&self, tenant_id: TenantId, range: &DateRange) -> Result<Vec<Transaction>> {
        let mut rows: Vec<Transaction> = self
            .transactions
            .read()
            .values()
            .filter(|t| t.tenant_id == tenant_id && range.contains(t.created_at))
            .cloned()
            .collect();
        oldest_first(&mut rows);
        Ok(rows)
    }
}
