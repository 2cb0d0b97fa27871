//! PostgreSQL transaction store.

use async_trait::async_trait;
use sarafi_common::{
    BranchId, Currency, CustomerId, DateRange, Money, Result, SarafiError, TenantId, TransactionId,
    UserId,
};
use sarafi_payments::PaymentMethodType;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::store::TransactionStore;
use crate::transaction::{ProfitStatus, Transaction};

const COLUMNS: &str = "id, tenant_id, branch_id, customer_id, send_amount, send_currency, \
    receive_amount, receive_currency, rate_applied, standard_rate, profit_amount, fee_amount, \
    payment_method, profit_status, profit_calculated_at, profit_checked_at, created_by, \
    created_at, updated_at";

fn db_err(e: sqlx::Error) -> SarafiError {
    SarafiError::Database(e.to_string())
}

fn corrupt(e: SarafiError) -> SarafiError {
    SarafiError::Database(e.to_string())
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
    let send_currency = Currency::new(row.try_get::<String, _>("send_currency").map_err(db_err)?);
    let receive_currency = Currency::new(row.try_get::<String, _>("receive_currency").map_err(db_err)?);
    let status: String = row.try_get("profit_status").map_err(db_err)?;
    let payment_method = row
        .try_get::<Option<String>, _>("payment_method")
        .map_err(db_err)?
        .map(|m| m.parse::<PaymentMethodType>())
        .transpose()
        .map_err(corrupt)?;

    Ok(Transaction {
        id: TransactionId::from_uuid(row.try_get("id").map_err(db_err)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(db_err)?),
        branch_id: row
            .try_get::<Option<Uuid>, _>("branch_id")
            .map_err(db_err)?
            .map(BranchId::from_uuid),
        customer_id: row
            .try_get::<Option<Uuid>, _>("customer_id")
            .map_err(db_err)?
            .map(CustomerId::from_uuid),
        send: Money::new(row.try_get("send_amount").map_err(db_err)?, send_currency.clone()),
        receive: Money::new(row.try_get("receive_amount").map_err(db_err)?, receive_currency.clone()),
        rate_applied: row.try_get("rate_applied").map_err(db_err)?,
        standard_rate: row.try_get("standard_rate").map_err(db_err)?,
        profit: Money::new(row.try_get("profit_amount").map_err(db_err)?, receive_currency),
        fee: Money::new(row.try_get("fee_amount").map_err(db_err)?, send_currency),
        payment_method,
        profit_status: status.parse::<ProfitStatus>().map_err(corrupt)?,
        profit_calculated_at: row.try_get("profit_calculated_at").map_err(db_err)?,
        profit_checked_at: row.try_get("profit_checked_at").map_err(db_err)?,
        created_by: UserId::from_uuid(row.try_get("created_by").map_err(db_err)?),
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

#[derive(Clone)]
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn insert(&self, tx: &Transaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, tenant_id, branch_id, customer_id, send_amount, send_currency,
                receive_amount, receive_currency, rate_applied, standard_rate, profit_amount,
                fee_amount, payment_method, profit_status, profit_calculated_at, profit_checked_at,
                created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(*tx.id.as_uuid())
        .bind(*tx.tenant_id.as_uuid())
        .bind(tx.branch_id.map(|b| *b.as_uuid()))
        .bind(tx.customer_id.map(|c| *c.as_uuid()))
        .bind(tx.send.value)
        .bind(tx.send.currency.code())
        .bind(tx.receive.value)
        .bind(tx.receive.currency.code())
        .bind(tx.rate_applied)
        .bind(tx.standard_rate)
        .bind(tx.profit.value)
        .bind(tx.fee.value)
        .bind(tx.payment_method.map(|m| m.as_str()))
        .bind(tx.profit_status.as_str())
        .bind(tx.profit_calculated_at)
        .bind(tx.profit_checked_at)
        .bind(*tx.created_by.as_uuid())
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, tenant_id: TenantId, id: TransactionId) -> Result<Option<Transaction>> {
        let sql = format!("SELECT {} FROM transactions WHERE tenant_id = $1 AND id = $2", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(*tenant_id.as_uuid())
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn update_profit(&self, tx: &Transaction) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET standard_rate = $3, profit_amount = $4, profit_status = $5,
                profit_calculated_at = $6, profit_checked_at = $7, updated_at = $8
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(*tx.tenant_id.as_uuid())
        .bind(*tx.id.as_uuid())
        .bind(tx.standard_rate)
        .bind(tx.profit.value)
        .bind(tx.profit_status.as_str())
        .bind(tx.profit_calculated_at)
        .bind(tx.profit_checked_at)
        .bind(tx.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(SarafiError::not_found("transaction", tx.id));
        }
        Ok(())
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE profit_status = 'pending' \
             ORDER BY profit_checked_at NULLS FIRST, created_at, id LIMIT $1",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(transaction_from_row).collect()
    }

    async fn list_between(&self, tenant_id: TenantId, range: &DateRange) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions \
             WHERE tenant_id = $1 AND created_at >= $2 AND created_at < $3 \
             ORDER BY created_at, id",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(*tenant_id.as_uuid())
            .bind(range.from)
            .bind(range.to)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(transaction_from_row).collect()
    }
}
