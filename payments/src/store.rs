//! Storage port for payment method configs.

use async_trait::async_trait;
use sarafi_common::{BranchId, PaymentMethodId, Result, TenantId};

use crate::method::{PaymentMethodConfig, PaymentMethodType};

/// Tenant-scoped persistence for payment method configs.
///
/// Soft-deleted rows are never returned by any read.
#[async_trait]
pub trait PaymentMethodStore: Send + Sync {
    /// Fails with a conflict if an active row already exists for the same
    /// tenant, branch and method type.
    async fn insert(&self, config: &PaymentMethodConfig) -> Result<()>;

    async fn get(&self, tenant_id: TenantId, id: PaymentMethodId) -> Result<Option<PaymentMethodConfig>>;

    /// Exact-scope lookup: `branch_id = None` matches only the tenant-global row.
    async fn find_active(
        &self,
        tenant_id: TenantId,
        branch_id: Option<BranchId>,
        method_type: PaymentMethodType,
    ) -> Result<Option<PaymentMethodConfig>>;

    /// Every active row of the tenant, global and branch-specific.
    async fn list_active(&self, tenant_id: TenantId) -> Result<Vec<PaymentMethodConfig>>;

    /// Overwrite an active row. Used for edits and soft deletes.
    async fn update(&self, config: &PaymentMethodConfig) -> Result<()>;
}
