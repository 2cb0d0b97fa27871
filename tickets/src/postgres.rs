//! PostgreSQL ticket store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sarafi_common::{
    ActivityId, BranchId, CustomerId, Result, SarafiError, TenantId, TicketId, TicketMessageId,
    UserId,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::store::TicketStore;
use crate::ticket::{
    ActivityAction, Ticket, TicketActivity, TicketFilter, TicketMessage, TicketPriority,
    TicketStatus,
};

const TICKET_COLUMNS: &str = "id, tenant_id, branch_id, customer_id, subject, description, \
    status, priority, assigned_to, created_by, resolution_notes, resolved_at, version, \
    created_at, updated_at";

fn db_err(e: sqlx::Error) -> SarafiError {
    SarafiError::Database(e.to_string())
}

fn corrupt(e: SarafiError) -> SarafiError {
    SarafiError::Database(e.to_string())
}

fn ticket_from_row(row: &PgRow) -> Result<Ticket> {
    let status: String = row.try_get("status").map_err(db_err)?;
    let priority: String = row.try_get("priority").map_err(db_err)?;
    Ok(Ticket {
        id: TicketId::from_uuid(row.try_get("id").map_err(db_err)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(db_err)?),
        branch_id: row
            .try_get::<Option<Uuid>, _>("branch_id")
            .map_err(db_err)?
            .map(BranchId::from_uuid),
        customer_id: row
            .try_get::<Option<Uuid>, _>("customer_id")
            .map_err(db_err)?
            .map(CustomerId::from_uuid),
        subject: row.try_get("subject").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        status: status.parse::<TicketStatus>().map_err(corrupt)?,
        priority: priority.parse::<TicketPriority>().map_err(corrupt)?,
        assigned_to: row
            .try_get::<Option<Uuid>, _>("assigned_to")
            .map_err(db_err)?
            .map(UserId::from_uuid),
        created_by: UserId::from_uuid(row.try_get("created_by").map_err(db_err)?),
        resolution_notes: row.try_get("resolution_notes").map_err(db_err)?,
        resolved_at: row.try_get("resolved_at").map_err(db_err)?,
        version: row.try_get("version").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn message_from_row(row: &PgRow) -> Result<TicketMessage> {
    Ok(TicketMessage {
        id: TicketMessageId::from_uuid(row.try_get("id").map_err(db_err)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(db_err)?),
        ticket_id: TicketId::from_uuid(row.try_get("ticket_id").map_err(db_err)?),
        author_id: UserId::from_uuid(row.try_get("author_id").map_err(db_err)?),
        body: row.try_get("body").map_err(db_err)?,
        is_internal: row.try_get("is_internal").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn activity_from_row(row: &PgRow) -> Result<TicketActivity> {
    let action: String = row.try_get("action").map_err(db_err)?;
    Ok(TicketActivity {
        id: ActivityId::from_uuid(row.try_get("id").map_err(db_err)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(db_err)?),
        ticket_id: TicketId::from_uuid(row.try_get("ticket_id").map_err(db_err)?),
        actor_id: UserId::from_uuid(row.try_get("actor_id").map_err(db_err)?),
        action: action.parse::<ActivityAction>().map_err(corrupt)?,
        old_value: row.try_get("old_value").map_err(db_err)?,
        new_value: row.try_get("new_value").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

async fn insert_activity(tx: &mut Transaction<'_, Postgres>, activity: &TicketActivity) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ticket_activities (
            id, tenant_id, ticket_id, actor_id, action, old_value, new_value, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(*activity.id.as_uuid())
    .bind(*activity.tenant_id.as_uuid())
    .bind(*activity.ticket_id.as_uuid())
    .bind(*activity.actor_id.as_uuid())
    .bind(activity.action.as_str())
    .bind(&activity.old_value)
    .bind(&activity.new_value)
    .bind(activity.created_at)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}

#[derive(Clone)]
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn insert_ticket(&self, ticket: &Ticket, activity: &TicketActivity) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            r#"
            INSERT INTO tickets (
                id, tenant_id, branch_id, customer_id, subject, description, status, priority,
                assigned_to, created_by, resolution_notes, resolved_at, version, created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(*ticket.id.as_uuid())
        .bind(*ticket.tenant_id.as_uuid())
        .bind(ticket.branch_id.map(|b| *b.as_uuid()))
        .bind(ticket.customer_id.map(|c| *c.as_uuid()))
        .bind(&ticket.subject)
        .bind(&ticket.description)
        .bind(ticket.status.as_str())
        .bind(ticket.priority.as_str())
        .bind(ticket.assigned_to.map(|u| *u.as_uuid()))
        .bind(*ticket.created_by.as_uuid())
        .bind(&ticket.resolution_notes)
        .bind(ticket.resolved_at)
        .bind(ticket.version)
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        insert_activity(&mut tx, activity).await?;
        tx.commit().await.map_err(db_err)
    }

    async fn update_ticket(
        &self,
        ticket: &Ticket,
        expected_version: i64,
        activity: &TicketActivity,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET status = $3, priority = $4, assigned_to = $5, resolution_notes = $6,
                resolved_at = $7, version = $8, updated_at = $9
            WHERE tenant_id = $1 AND id = $2 AND version = $10
            "#,
        )
        .bind(*ticket.tenant_id.as_uuid())
        .bind(*ticket.id.as_uuid())
        .bind(ticket.status.as_str())
        .bind(ticket.priority.as_str())
        .bind(ticket.assigned_to.map(|u| *u.as_uuid()))
        .bind(&ticket.resolution_notes)
        .bind(ticket.resolved_at)
        .bind(ticket.version)
        .bind(ticket.updated_at)
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tickets WHERE tenant_id = $1 AND id = $2)")
                    .bind(*ticket.tenant_id.as_uuid())
                    .bind(*ticket.id.as_uuid())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_err)?;
            if !exists {
                return Err(SarafiError::not_found("ticket", ticket.id));
            }
            return Err(SarafiError::Conflict(format!(
                "ticket {} changed concurrently (expected version {})",
                ticket.id, expected_version
            )));
        }
        insert_activity(&mut tx, activity).await?;
        tx.commit().await.map_err(db_err)
    }

    async fn get_ticket(&self, tenant_id: TenantId, id: TicketId) -> Result<Option<Ticket>> {
        let sql = format!("SELECT {} FROM tickets WHERE tenant_id = $1 AND id = $2", TICKET_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(*tenant_id.as_uuid())
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(ticket_from_row).transpose()
    }

    async fn list_tickets(&self, tenant_id: TenantId, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        let sql = format!(
            "SELECT {} FROM tickets \
             WHERE tenant_id = $1 \
               AND ($2::text IS NULL OR status = $2) \
               AND ($3::text IS NULL OR priority = $3) \
               AND ($4::uuid IS NULL OR assigned_to = $4) \
             ORDER BY created_at DESC, id DESC",
            TICKET_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(*tenant_id.as_uuid())
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.priority.map(|p| p.as_str()))
            .bind(filter.assigned_to.map(|u| *u.as_uuid()))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(ticket_from_row).collect()
    }

    async fn insert_message(&self, message: &TicketMessage, activity: &TicketActivity) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            r#"
            INSERT INTO ticket_messages (id, tenant_id, ticket_id, author_id, body, is_internal, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(*message.id.as_uuid())
        .bind(*message.tenant_id.as_uuid())
        .bind(*message.ticket_id.as_uuid())
        .bind(*message.author_id.as_uuid())
        .bind(&message.body)
        .bind(message.is_internal)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        insert_activity(&mut tx, activity).await?;
        tx.commit().await.map_err(db_err)
    }

    async fn list_messages(
        &self,
        tenant_id: TenantId,
        ticket_id: TicketId,
        include_internal: bool,
    ) -> Result<Vec<TicketMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, ticket_id, author_id, body, is_internal, created_at
            FROM ticket_messages
            WHERE tenant_id = $1 AND ticket_id = $2 AND ($3 OR NOT is_internal)
            ORDER BY created_at, id
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*ticket_id.as_uuid())
        .bind(include_internal)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(message_from_row).collect()
    }

    async fn list_activity(&self, tenant_id: TenantId, ticket_id: TicketId) -> Result<Vec<TicketActivity>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, ticket_id, actor_id, action, old_value, new_value, created_at
            FROM ticket_activities
            WHERE tenant_id = $1 AND ticket_id = $2
            ORDER BY created_at, id
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*ticket_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(activity_from_row).collect()
    }

    async fn status_counts(&self, tenant_id: TenantId) -> Result<BTreeMap<TicketStatus, u64>> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM tickets WHERE tenant_id = $1 GROUP BY status",
        )
        .bind(*tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut counts = BTreeMap::new();
        for row in &rows {
            let status: String = row.try_get("status").map_err(db_err)?;
            let n: i64 = row.try_get("n").map_err(db_err)?;
            counts.insert(status.parse::<TicketStatus>().map_err(corrupt)?, n.max(0) as u64);
        }
        Ok(counts)
    }
}

