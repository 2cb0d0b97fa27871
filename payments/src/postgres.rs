//! PostgreSQL payment method store.
//!
//! The fee formula is stored as `fee_type` text plus nullable
//! `fee_percent`/`fee_flat` columns, and rebuilt through
//! [`FeeFormula::from_parts`] so a corrupt row surfaces as an error.

use async_trait::async_trait;
use sarafi_common::{BranchId, PaymentMethodId, Result, SarafiError, TenantId};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::method::{FeeFormula, PaymentMethodConfig, PaymentMethodType};
use crate::store::PaymentMethodStore;

const COLUMNS: &str = "id, tenant_id, branch_id, method_type, display_name, enabled, \
    fee_type, fee_percent, fee_flat, min_amount, max_amount, sort_order, \
    created_at, updated_at, deleted_at";

fn db_err(e: sqlx::Error) -> SarafiError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return SarafiError::Conflict(db.message().to_string());
        }
    }
    SarafiError::Database(e.to_string())
}

fn config_from_row(row: &PgRow) -> Result<PaymentMethodConfig> {
    let method_type: String = row.try_get("method_type").map_err(db_err)?;
    let fee_type: String = row.try_get("fee_type").map_err(db_err)?;
    let corrupt = |e: SarafiError| SarafiError::Database(e.to_string());

    Ok(PaymentMethodConfig {
        id: PaymentMethodId::from_uuid(row.try_get("id").map_err(db_err)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(db_err)?),
        branch_id: row
            .try_get::<Option<Uuid>, _>("branch_id")
            .map_err(db_err)?
            .map(BranchId::from_uuid),
        method_type: method_type.parse::<PaymentMethodType>().map_err(corrupt)?,
        display_name: row.try_get("display_name").map_err(db_err)?,
        enabled: row.try_get("enabled").map_err(db_err)?,
        fee: FeeFormula::from_parts(
            &fee_type,
            row.try_get("fee_percent").map_err(db_err)?,
            row.try_get("fee_flat").map_err(db_err)?,
        )
        .map_err(corrupt)?,
        min_amount: row.try_get("min_amount").map_err(db_err)?,
        max_amount: row.try_get("max_amount").map_err(db_err)?,
        sort_order: row.try_get("sort_order").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
        deleted_at: row.try_get("deleted_at").map_err(db_err)?,
    })
}

#[derive(Clone)]
pub struct PgPaymentMethodStore {
    pool: PgPool,
}

impl PgPaymentMethodStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentMethodStore for PgPaymentMethodStore {
    async fn insert(&self, config: &PaymentMethodConfig) -> Result<()> {
        // A partial unique index on (tenant, branch, method) WHERE deleted_at
        // IS NULL turns duplicates into a unique violation.
        sqlx::query(
            r#"
            INSERT INTO payment_method_configs (
                id, tenant_id, branch_id, method_type, display_name, enabled,
                fee_type, fee_percent, fee_flat, min_amount, max_amount, sort_order,
                created_at, updated_at, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(*config.id.as_uuid())
        .bind(*config.tenant_id.as_uuid())
        .bind(config.branch_id.map(|b| *b.as_uuid()))
        .bind(config.method_type.as_str())
        .bind(&config.display_name)
        .bind(config.enabled)
        .bind(config.fee.fee_type())
        .bind(config.fee.percent())
        .bind(config.fee.flat())
        .bind(config.min_amount)
        .bind(config.max_amount)
        .bind(config.sort_order)
        .bind(config.created_at)
        .bind(config.updated_at)
        .bind(config.deleted_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, tenant_id: TenantId, id: PaymentMethodId) -> Result<Option<PaymentMethodConfig>> {
        let sql = format!(
            "SELECT {} FROM payment_method_configs \
             WHERE tenant_id = $1 AND id = $2 AND deleted_at IS NULL",
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(*tenant_id.as_uuid())
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(config_from_row).transpose()
    }

    async fn find_active(
        &self,
        tenant_id: TenantId,
        branch_id: Option<BranchId>,
        method_type: PaymentMethodType,
    ) -> Result<Option<PaymentMethodConfig>> {
        let sql = format!(
            "SELECT {} FROM payment_method_configs \
             WHERE tenant_id = $1 AND branch_id IS NOT DISTINCT FROM $2 \
               AND method_type = $3 AND deleted_at IS NULL",
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(*tenant_id.as_uuid())
            .bind(branch_id.map(|b| *b.as_uuid()))
            .bind(method_type.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(config_from_row).transpose()
    }

    async fn list_active(&self, tenant_id: TenantId) -> Result<Vec<PaymentMethodConfig>> {
        let sql = format!(
            "SELECT {} FROM payment_method_configs \
             WHERE tenant_id = $1 AND deleted_at IS NULL \
             ORDER BY sort_order, display_name",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(*tenant_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(config_from_row).collect()
    }

    async fn update(&self, config: &PaymentMethodConfig) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payment_method_configs
            SET display_name = $3, enabled = $4, fee_type = $5, fee_percent = $6,
                fee_flat = $7, min_amount = $8, max_amount = $9, sort_order = $10,
                updated_at = $11, deleted_at = $12
            WHERE tenant_id = $1 AND id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(*config.tenant_id.as_uuid())
        .bind(*config.id.as_uuid())
        .bind(&config.display_name)
        .bind(config.enabled)
        .bind(config.fee.fee_type())
        .bind(config.fee.percent())
        .bind(config.fee.flat())
        .bind(config.min_amount)
        .bind(config.max_amount)
        .bind(config.sort_order)
        .bind(config.updated_at)
        .bind(config.deleted_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(SarafiError::not_found("payment method", config.id));
        }
        Ok(())
    }
}
