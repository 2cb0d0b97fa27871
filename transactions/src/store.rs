//! Storage port for transactions.

use async_trait::async_trait;
use sarafi_common::{DateRange, Result, TenantId, TransactionId};

use crate::transaction::Transaction;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, transaction: &Transaction) -> Result<()>;

    async fn get(&self, tenant_id: TenantId, id: TransactionId) -> Result<Option<Transaction>>;

    /// Persist a profit recalculation attempt: standard rate, profit, status
    /// and timestamps, including `profit_checked_at`. Other fields are
    /// immutable.
    async fn update_profit(&self, transaction: &Transaction) -> Result<()>;

    /// Pending transactions of every tenant. Never-checked rows come first,
    /// then the least recently checked, so rows that stay unpriceable rotate
    /// to the back of the queue.
    async fn list_pending(&self, limit: usize) -> Result<Vec<Transaction>>;

    /// Transactions created inside `range`, oldest first.
    async fn list_between(&self, tenant_id: TenantId, range: &DateRange) -> Result<Vec<Transaction>>;
}
