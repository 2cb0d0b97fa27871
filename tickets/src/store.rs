//! Storage port for tickets.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sarafi_common::{Result, TenantId, TicketId};

use crate::ticket::{Ticket, TicketActivity, TicketFilter, TicketMessage, TicketStatus};

/// Tenant-scoped ticket persistence.
///
/// Every write takes the activity entry describing it and stores both
/// together, so the log never misses or invents a change.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn insert_ticket(&self, ticket: &Ticket, activity: &TicketActivity) -> Result<()>;

    /// Overwrite a ticket if its stored version still equals
    /// `expected_version`; otherwise fail with `SarafiError::Conflict` and
    /// record nothing.
    async fn update_ticket(
        &self,
        ticket: &Ticket,
        expected_version: i64,
        activity: &TicketActivity,
    ) -> Result<()>;

    async fn get_ticket(&self, tenant_id: TenantId, id: TicketId) -> Result<Option<Ticket>>;

    /// Newest first.
    async fn list_tickets(&self, tenant_id: TenantId, filter: &TicketFilter) -> Result<Vec<Ticket>>;

    async fn insert_message(&self, message: &TicketMessage, activity: &TicketActivity) -> Result<()>;

    /// Oldest first.
    async fn list_messages(
        &self,
        tenant_id: TenantId,
        ticket_id: TicketId,
        include_internal: bool,
    ) -> Result<Vec<TicketMessage>>;

    /// Oldest first.
    async fn list_activity(&self, tenant_id: TenantId, ticket_id: TicketId) -> Result<Vec<TicketActivity>>;

    /// Number of tickets per status. Statuses without tickets are absent.
    async fn status_counts(&self, tenant_id: TenantId) -> Result<BTreeMap<TicketStatus, u64>> {
        let mut counts = BTreeMap::new();
        for ticket in self.list_tickets(tenant_id, &TicketFilter::default()).await? {
            *counts.entry(ticket.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
