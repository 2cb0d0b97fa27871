//! In-memory payment method store.

use async_trait::async_trait;
use parking_lot::RwLock;
use sarafi_common::{BranchId, PaymentMethodId, Result, SarafiError, TenantId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::method::{PaymentMethodConfig, PaymentMethodType};
use crate::store::PaymentMethodStore;

#[derive(Default, Clone)]
pub struct InMemoryPaymentMethodStore {
    configs: Arc<RwLock<HashMap<PaymentMethodId, PaymentMethodConfig>>>,
}

impl InMemoryPaymentMethodStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn same_scope(a: &PaymentMethodConfig, b: &PaymentMethodConfig) -> bool {
    a.tenant_id == b.tenant_id && a.branch_id == b.branch_id && a.method_type == b.method_type
}

#[async_trait]
impl PaymentMethodStore for InMemoryPaymentMethodStore {
    async fn insert(&self, config: &PaymentMethodConfig) -> Result<()> {
        let mut configs = self.configs.write();
        let duplicate = configs
            .values()
            .any(|c| !c.is_deleted() && same_scope(c, config));
        if duplicate || configs.contains_key(&config.id) {
            return Err(SarafiError::Conflict(format!(
                "{} is already configured for this scope",
                config.method_type
            )));
        }
        configs.insert(config.id, config.clone());
        Ok(())
    }

    async fn get(&self, tenant_id: TenantId, id: PaymentMethodId) -> Result<Option<PaymentMethodConfig>> {
        Ok(self
            .configs
            .read()
            .get(&id)
            .filter(|c| c.tenant_id == tenant_id && !c.is_deleted())
            .cloned())
    }

    async fn find_active(
        &self,
        tenant_id: TenantId,
        branch_id: Option<BranchId>,
        method_type: PaymentMethodType,
    ) -> Result<Option<PaymentMethodConfig>> {
        Ok(self
            .configs
            .read()
            .values()
            .find(|c| {
                c.tenant_id == tenant_id
                    && c.branch_id == branch_id
                    && c.method_type == method_type
                    && !c.is_deleted()
            })
            .cloned())
    }

    async fn list_active(&self, tenant_id: TenantId) -> Result<Vec<PaymentMethodConfig>> {
        Ok(self
            .configs
            .read()
            .values()
            .filter(|c| c.tenant_id == tenant_id && !c.is_deleted())
            .cloned()
            .collect())
    }

    async fn update(&self, config: &PaymentMethodConfig) -> Result<()> {
        let mut configs = self.configs.write();
        let stored = configs
            .get_mut(&config.id)
            .filter(|c| c.tenant_id == config.tenant_id && !c.is_deleted())
            .ok_or_else(|| SarafiError::not_found("payment method", config.id))?;
        *stored = config.clone();
        Ok(())
    }
}
