//! Payment method service.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sarafi_common::{BranchId, PaymentMethodId, Result, SarafiError, TenantId};
use tracing::{debug, info, instrument};

use crate::method::{NewPaymentMethodConfig, PaymentMethodConfig, PaymentMethodType, PaymentMethodUpdate};
use crate::store::PaymentMethodStore;

const ENTITY: &str = "payment method";

/// Resolves, validates and prices payment methods.
pub struct PaymentMethodService {
    store: Arc<dyn PaymentMethodStore>,
}

impl PaymentMethodService {
    pub fn new(store: Arc<dyn PaymentMethodStore>) -> Self {
        Self { store }
    }

    /// Configure a payment method for a tenant, or one of its branches.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, method = %input.method_type))]
    pub async fn create(&self, input: NewPaymentMethodConfig) -> Result<PaymentMethodConfig> {
        let now = Utc::now();
        let config = PaymentMethodConfig {
            id: PaymentMethodId::new(),
            tenant_id: input.tenant_id,
            branch_id: input.branch_id,
            method_type: input.method_type,
            display_name: input.display_name.trim().to_string(),
            enabled: input.enabled,
            fee: input.fee,
            min_amount: input.min_amount,
            max_amount: input.max_amount,
            sort_order: input.sort_order,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        config.validate()?;

        if self
            .store
            .find_active(config.tenant_id, config.branch_id, config.method_type)
            .await?
            .is_some()
        {
            return Err(SarafiError::Conflict(format!(
                "{} is already configured for this scope",
                config.method_type
            )));
        }

        self.store.insert(&config).await?;
        info!(payment_method_id = %config.id, "Payment method configured");
        Ok(config)
    }

    pub async fn get(&self, tenant_id: TenantId, id: PaymentMethodId) -> Result<PaymentMethodConfig> {
        self.store
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| SarafiError::not_found(ENTITY, id))
    }

    #[instrument(skip(self, update))]
    pub async fn update(
        &self,
        tenant_id: TenantId,
        id: PaymentMethodId,
        update: PaymentMethodUpdate,
    ) -> Result<PaymentMethodConfig> {
        let mut config = self.get(tenant_id, id).await?;
        update.apply(&mut config);
        config.validate()?;
        config.updated_at = Utc::now();

        self.store.update(&config).await?;
        info!(payment_method_id = %id, "Payment method updated");
        Ok(config)
    }

    /// Soft delete. The row stays for audit but no lookup sees it again.
    #[instrument(skip(self))]
    pub async fn delete(&self, tenant_id: TenantId, id: PaymentMethodId) -> Result<()> {
        let mut config = self.get(tenant_id, id).await?;
        let now = Utc::now();
        config.deleted_at = Some(now);
        config.updated_at = now;

        self.store.update(&config).await?;
        info!(payment_method_id = %id, "Payment method deleted");
        Ok(())
    }

    /// The config that applies: the branch row if there is one, else the
    /// tenant-global row.
    pub async fn resolve(
        &self,
        tenant_id: TenantId,
        branch_id: Option<BranchId>,
        method_type: PaymentMethodType,
    ) -> Result<Option<PaymentMethodConfig>> {
        if let Some(branch_id) = branch_id {
            if let Some(config) = self
                .store
                .find_active(tenant_id, Some(branch_id), method_type)
                .await?
            {
                return Ok(Some(config));
            }
        }
        self.store.find_active(tenant_id, None, method_type).await
    }

    /// Reject `amount` if the applicable config is disabled or its bounds
    /// exclude it. Without any config every amount passes.
    #[instrument(skip(self))]
    pub async fn validate_payment(
        &self,
        tenant_id: TenantId,
        branch_id: Option<BranchId>,
        method_type: PaymentMethodType,
        amount: Decimal,
    ) -> Result<()> {
        match self.resolve(tenant_id, branch_id, method_type).await? {
            Some(config) => config.check_amount(amount),
            None => {
                debug!("No payment method config, allowing");
                Ok(())
            }
        }
    }

    /// Fee for `amount` under the applicable config. Zero without one, and
    /// zero when it is disabled since no payment can be taken through it.
    pub async fn calculate_fee(
        &self,
        tenant_id: TenantId,
        branch_id: Option<BranchId>,
        method_type: PaymentMethodType,
        amount: Decimal,
    ) -> Result<Decimal> {
        Ok(self
            .resolve(tenant_id, branch_id, method_type)
            .await?
            .filter(|config| config.enabled)
            .map_or(Decimal::ZERO, |config| config.fee.fee_for(amount)))
    }

    /// Enabled methods as seen from `branch_id`, after branch overrides,
    /// ordered by sort order then display name.
    pub async fn list_effective(
        &self,
        tenant_id: TenantId,
        branch_id: Option<BranchId>,
    ) -> Result<Vec<PaymentMethodConfig>> {
        let mut effective: BTreeMap<PaymentMethodType, PaymentMethodConfig> = BTreeMap::new();

        for config in self.store.list_active(tenant_id).await? {
            if config.branch_id.is_some() && config.branch_id != branch_id {
                continue;
            }
            let overrides = config.branch_id.is_some();
            match effective.get(&config.method_type) {
                Some(existing) if existing.branch_id.is_some() && !overrides => {}
                _ => {
                    effective.insert(config.method_type, config);
                }
            }
        }

        let mut methods: Vec<PaymentMethodConfig> =
            effective.into_values().filter(|c| c.enabled).collect();
        methods.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        Ok(methods)
    }
}
