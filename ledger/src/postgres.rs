//! PostgreSQL ledger store.
//!
//! Settlement commits run in one transaction; each balance update is
//! `UPDATE ... WHERE version = $expected`, and zero affected rows rolls the
//! whole commit back as a conflict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sarafi_common::{
    BranchId, DateRange, RemittanceId, Result, SarafiError, SettlementId, TenantId, UserId,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::balance::{RemittanceBalance, RemittanceStatus};
use crate::remittance::{IncomingRemittance, OutgoingRemittance, RemittanceFilter};
use crate::settlement::{ProfitSummary, RemittanceSettlement, SettlementCommit};
use crate::store::LedgerStore;

fn db_err(e: sqlx::Error) -> SarafiError {
    SarafiError::Database(e.to_string())
}

const OUTGOING_COLUMNS: &str = "id, tenant_id, branch_id, sender_name, recipient_name, \
    recipient_account, amount_irr, buy_rate_cad, equivalent_cad, settled_irr, remaining_irr, \
    total_profit_cad, status, version, notes, created_by, created_at, updated_at";

const INCOMING_COLUMNS: &str = "id, tenant_id, branch_id, sender_name, recipient_name, \
    sender_account, amount_irr, sell_rate_cad, equivalent_cad, settled_irr, remaining_irr, \
    total_profit_cad, status, version, notes, created_by, created_at, updated_at";

const SETTLEMENT_COLUMNS: &str = "id, tenant_id, outgoing_id, incoming_id, amount_irr, \
    buy_rate_cad, sell_rate_cad, profit_cad, created_by, created_at";

fn balance_from_row(row: &PgRow) -> Result<RemittanceBalance> {
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(RemittanceBalance {
        amount_irr: row.try_get("amount_irr").map_err(db_err)?,
        settled_irr: row.try_get("settled_irr").map_err(db_err)?,
        remaining_irr: row.try_get("remaining_irr").map_err(db_err)?,
        total_profit_cad: row.try_get("total_profit_cad").map_err(db_err)?,
        status: status
            .parse::<RemittanceStatus>()
            .map_err(|e| SarafiError::Database(e.to_string()))?,
        version: row.try_get("version").map_err(db_err)?,
    })
}

fn outgoing_from_row(row: &PgRow) -> Result<OutgoingRemittance> {
    Ok(OutgoingRemittance {
        id: RemittanceId::from_uuid(row.try_get("id").map_err(db_err)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(db_err)?),
        branch_id: row
            .try_get::<Option<Uuid>, _>("branch_id")
            .map_err(db_err)?
            .map(BranchId::from_uuid),
        sender_name: row.try_get("sender_name").map_err(db_err)?,
        recipient_name: row.try_get("recipient_name").map_err(db_err)?,
        recipient_account: row.try_get("recipient_account").map_err(db_err)?,
        buy_rate_cad: row.try_get("buy_rate_cad").map_err(db_err)?,
        equivalent_cad: row.try_get("equivalent_cad").map_err(db_err)?,
        balance: balance_from_row(row)?,
        notes: row.try_get("notes").map_err(db_err)?,
        created_by: UserId::from_uuid(row.try_get("created_by").map_err(db_err)?),
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn incoming_from_row(row: &PgRow) -> Result<IncomingRemittance> {
    Ok(IncomingRemittance {
        id: RemittanceId::from_uuid(row.try_get("id").map_err(db_err)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(db_err)?),
        branch_id: row
            .try_get::<Option<Uuid>, _>("branch_id")
            .map_err(db_err)?
            .map(BranchId::from_uuid),
        sender_name: row.try_get("sender_name").map_err(db_err)?,
        recipient_name: row.try_get("recipient_name").map_err(db_err)?,
        sender_account: row.try_get("sender_account").map_err(db_err)?,
        sell_rate_cad: row.try_get("sell_rate_cad").map_err(db_err)?,
        equivalent_cad: row.try_get("equivalent_cad").map_err(db_err)?,
        balance: balance_from_row(row)?,
        notes: row.try_get("notes").map_err(db_err)?,
        created_by: UserId::from_uuid(row.try_get("created_by").map_err(db_err)?),
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn settlement_from_row(row: &PgRow) -> Result<RemittanceSettlement> {
    Ok(RemittanceSettlement {
        id: SettlementId::from_uuid(row.try_get("id").map_err(db_err)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(db_err)?),
        outgoing_id: RemittanceId::from_uuid(row.try_get("outgoing_id").map_err(db_err)?),
        incoming_id: RemittanceId::from_uuid(row.try_get("incoming_id").map_err(db_err)?),
        amount_irr: row.try_get("amount_irr").map_err(db_err)?,
        buy_rate_cad: row.try_get("buy_rate_cad").map_err(db_err)?,
        sell_rate_cad: row.try_get("sell_rate_cad").map_err(db_err)?,
        profit_cad: row.try_get("profit_cad").map_err(db_err)?,
        created_by: UserId::from_uuid(row.try_get("created_by").map_err(db_err)?),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(db_err)?,
    })
}

fn conflict(entity: &str, id: RemittanceId) -> SarafiError {
    SarafiError::Conflict(format!("{} {} changed concurrently", entity, id))
}

/// Ledger store over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn write_outgoing_balance(
        tx: &mut Transaction<'_, Postgres>,
        remittance: &OutgoingRemittance,
        expected_version: i64,
    ) -> Result<u64> {
        let balance = &remittance.balance;
        let result = sqlx::query(
            r#"
            UPDATE outgoing_remittances
            SET settled_irr = $3, remaining_irr = $4, total_profit_cad = $5,
                status = $6, version = $7, updated_at = $8
            WHERE tenant_id = $1 AND id = $2 AND version = $9
            "#,
        )
        .bind(*remittance.tenant_id.as_uuid())
        .bind(*remittance.id.as_uuid())
        .bind(balance.settled_irr)
        .bind(balance.remaining_irr)
        .bind(balance.total_profit_cad)
        .bind(balance.status.as_str())
        .bind(balance.version)
        .bind(remittance.updated_at)
        .bind(expected_version)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn write_incoming_balance(
        tx: &mut Transaction<'_, Postgres>,
        remittance: &IncomingRemittance,
        expected_version: i64,
    ) -> Result<u64> {
        let balance = &remittance.balance;
        let result = sqlx::query(
            r#"
            UPDATE incoming_remittances
            SET settled_irr = $3, remaining_irr = $4, total_profit_cad = $5,
                status = $6, version = $7, updated_at = $8
            WHERE tenant_id = $1 AND id = $2 AND version = $9
            "#,
        )
        .bind(*remittance.tenant_id.as_uuid())
        .bind(*remittance.id.as_uuid())
        .bind(balance.settled_irr)
        .bind(balance.remaining_irr)
        .bind(balance.total_profit_cad)
        .bind(balance.status.as_str())
        .bind(balance.version)
        .bind(remittance.updated_at)
        .bind(expected_version)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn select_settlements(
        &self,
        predicate: &str,
        tenant_id: TenantId,
        id: RemittanceId,
    ) -> Result<Vec<RemittanceSettlement>> {
        let sql = format!(
            "SELECT {} FROM remittance_settlements WHERE tenant_id = $1 AND {} = $2 \
             ORDER BY created_at, id",
            SETTLEMENT_COLUMNS, predicate
        );
        let rows = sqlx::query(&sql)
            .bind(*tenant_id.as_uuid())
            .bind(*id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(settlement_from_row).collect()
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert_outgoing(&self, remittance: &OutgoingRemittance) -> Result<()> {
        let balance = &remittance.balance;
        sqlx::query(
            r#"
            INSERT INTO outgoing_remittances (
                id, tenant_id, branch_id, sender_name, recipient_name, recipient_account,
                amount_irr, buy_rate_cad, equivalent_cad, settled_irr, remaining_irr,
                total_profit_cad, status, version, notes, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(*remittance.id.as_uuid())
        .bind(*remittance.tenant_id.as_uuid())
        .bind(remittance.branch_id.map(|b| *b.as_uuid()))
        .bind(&remittance.sender_name)
        .bind(&remittance.recipient_name)
        .bind(&remittance.recipient_account)
        .bind(balance.amount_irr)
        .bind(remittance.buy_rate_cad)
        .bind(remittance.equivalent_cad)
        .bind(balance.settled_irr)
        .bind(balance.remaining_irr)
        .bind(balance.total_profit_cad)
        .bind(balance.status.as_str())
        .bind(balance.version)
        .bind(&remittance.notes)
        .bind(*remittance.created_by.as_uuid())
        .bind(remittance.created_at)
        .bind(remittance.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_incoming(&self, remittance: &IncomingRemittance) -> Result<()> {
        let balance = &remittance.balance;
        sqlx::query(
            r#"
            INSERT INTO incoming_remittances (
                id, tenant_id, branch_id, sender_name, recipient_name, sender_account,
                amount_irr, sell_rate_cad, equivalent_cad, settled_irr, remaining_irr,
                total_profit_cad, status, version, notes, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(*remittance.id.as_uuid())
        .bind(*remittance.tenant_id.as_uuid())
        .bind(remittance.branch_id.map(|b| *b.as_uuid()))
        .bind(&remittance.sender_name)
        .bind(&remittance.recipient_name)
        .bind(&remittance.sender_account)
        .bind(balance.amount_irr)
        .bind(remittance.sell_rate_cad)
        .bind(remittance.equivalent_cad)
        .bind(balance.settled_irr)
        .bind(balance.remaining_irr)
        .bind(balance.total_profit_cad)
        .bind(balance.status.as_str())
        .bind(balance.version)
        .bind(&remittance.notes)
        .bind(*remittance.created_by.as_uuid())
        .bind(remittance.created_at)
        .bind(remittance.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_outgoing(&self, tenant_id: TenantId, id: RemittanceId) -> Result<Option<OutgoingRemittance>> {
        let sql = format!(
            "SELECT {} FROM outgoing_remittances WHERE tenant_id = $1 AND id = $2",
            OUTGOING_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(*tenant_id.as_uuid())
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(outgoing_from_row).transpose()
    }

    async fn get_incoming(&self, tenant_id: TenantId, id: RemittanceId) -> Result<Option<IncomingRemittance>> {
        let sql = format!(
            "SELECT {} FROM incoming_remittances WHERE tenant_id = $1 AND id = $2",
            INCOMING_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(*tenant_id.as_uuid())
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(incoming_from_row).transpose()
    }

    async fn list_outgoing(&self, tenant_id: TenantId, filter: &RemittanceFilter) -> Result<Vec<OutgoingRemittance>> {
        let sql = format!(
            "SELECT {} FROM outgoing_remittances \
             WHERE tenant_id = $1 \
               AND ($2::text IS NULL OR status = $2) \
               AND ($3::uuid IS NULL OR branch_id = $3) \
             ORDER BY created_at DESC, id DESC",
            OUTGOING_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(*tenant_id.as_uuid())
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.branch_id.map(|b| *b.as_uuid()))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(outgoing_from_row).collect()
    }

    async fn list_incoming(&self, tenant_id: TenantId, filter: &RemittanceFilter) -> Result<Vec<IncomingRemittance>> {
        let sql = format!(
            "SELECT {} FROM incoming_remittances \
             WHERE tenant_id = $1 \
               AND ($2::text IS NULL OR status = $2) \
               AND ($3::uuid IS NULL OR branch_id = $3) \
             ORDER BY created_at DESC, id DESC",
            INCOMING_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(*tenant_id.as_uuid())
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.branch_id.map(|b| *b.as_uuid()))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(incoming_from_row).collect()
    }

    async fn update_outgoing(&self, remittance: &OutgoingRemittance, expected_version: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        if Self::write_outgoing_balance(&mut tx, remittance, expected_version).await? == 0 {
            return Err(conflict("outgoing remittance", remittance.id));
        }
        tx.commit().await.map_err(db_err)
    }

    async fn update_incoming(&self, remittance: &IncomingRemittance, expected_version: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        if Self::write_incoming_balance(&mut tx, remittance, expected_version).await? == 0 {
            return Err(conflict("incoming remittance", remittance.id));
        }
        tx.commit().await.map_err(db_err)
    }

    async fn commit_settlement(&self, commit: &SettlementCommit) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Dropping `tx` without commit rolls back.
        if Self::write_outgoing_balance(&mut tx, &commit.outgoing, commit.outgoing_version).await? == 0 {
            return Err(conflict("outgoing remittance", commit.outgoing.id));
        }
        if Self::write_incoming_balance(&mut tx, &commit.incoming, commit.incoming_version).await? == 0 {
            return Err(conflict("incoming remittance", commit.incoming.id));
        }

        let s = &commit.settlement;
        sqlx::query(
            r#"
            INSERT INTO remittance_settlements (
                id, tenant_id, outgoing_id, incoming_id, amount_irr,
                buy_rate_cad, sell_rate_cad, profit_cad, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(*s.id.as_uuid())
        .bind(*s.tenant_id.as_uuid())
        .bind(*s.outgoing_id.as_uuid())
        .bind(*s.incoming_id.as_uuid())
        .bind(s.amount_irr)
        .bind(s.buy_rate_cad)
        .bind(s.sell_rate_cad)
        .bind(s.profit_cad)
        .bind(*s.created_by.as_uuid())
        .bind(s.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        debug!(settlement_id = %s.id, "Settlement committed");
        Ok(())
    }

    async fn settlements_for_outgoing(&self, tenant_id: TenantId, id: RemittanceId) -> Result<Vec<RemittanceSettlement>> {
        self.select_settlements("outgoing_id", tenant_id, id).await
    }

    async fn settlements_for_incoming(&self, tenant_id: TenantId, id: RemittanceId) -> Result<Vec<RemittanceSettlement>> {
        self.select_settlements("incoming_id", tenant_id, id).await
    }

    async fn settlements_between(&self, tenant_id: TenantId, range: &DateRange) -> Result<Vec<RemittanceSettlement>> {
        let sql = format!(
            "SELECT {} FROM remittance_settlements \
             WHERE tenant_id = $1 AND created_at >= $2 AND created_at < $3 \
             ORDER BY created_at, id",
            SETTLEMENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(*tenant_id.as_uuid())
            .bind(range.from)
            .bind(range.to)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(settlement_from_row).collect()
    }

    async fn profit_summary(&self, tenant_id: TenantId, range: &DateRange) -> Result<ProfitSummary> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS settlement_count,
                   COALESCE(SUM(amount_irr), 0) AS total_settled_irr,
                   COALESCE(SUM(profit_cad), 0) AS total_profit_cad
            FROM remittance_settlements
            WHERE tenant_id = $1 AND created_at >= $2 AND created_at < $3
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(range.from)
        .bind(range.to)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let count: i64 = row.try_get("settlement_count").map_err(db_err)?;
        let total_settled_irr: Decimal = row.try_get("total_settled_irr").map_err(db_err)?;
        let total_profit_cad: Decimal = row.try_get("total_profit_cad").map_err(db_err)?;
        Ok(ProfitSummary::from_totals(count.max(0) as u64, total_settled_irr, total_profit_cad))
    }
}
