//! In-memory ticket store.

use async_trait::async_trait;
use parking_lot::RwLock;
use sarafi_common::{Result, SarafiError, TenantId, TicketId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::store::TicketStore;
use crate::ticket::{Ticket, TicketActivity, TicketFilter, TicketMessage};

#[derive(Default)]
struct Tables {
    tickets: HashMap<TicketId, Ticket>,
    messages: Vec<TicketMessage>,
    activity: Vec<TicketActivity>,
}

#[derive(Default, Clone)]
pub struct InMemoryTicketStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn owns(tables: &Tables, tenant_id: TenantId, ticket_id: TicketId) -> bool {
    tables
        .tickets
        .get(&ticket_id)
        .map_or(false, |t| t.tenant_id == tenant_id)
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn insert_ticket(&self, ticket: &Ticket, activity: &TicketActivity) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.tickets.contains_key(&ticket.id) {
            return Err(SarafiError::Conflict(format!("ticket {} exists", ticket.id)));
        }
        tables.tickets.insert(ticket.id, ticket.clone());
        tables.activity.push(activity.clone());
        Ok(())
    }

    async fn update_ticket(
        &self,
        ticket: &Ticket,
        expected_version: i64,
        activity: &TicketActivity,
    ) -> Result<()> {
        let mut tables = self.tables.write();
        let stored = match tables.tickets.get(&ticket.id) {
            Some(t) if t.tenant_id == ticket.tenant_id => t.version,
            _ => return Err(SarafiError::not_found("ticket", ticket.id)),
        };
        if stored != expected_version {
            return Err(SarafiError::Conflict(format!(
                "ticket {} changed concurrently (version {} != {})",
                ticket.id, stored, expected_version
            )));
        }
        tables.tickets.insert(ticket.id, ticket.clone());
        tables.activity.push(activity.clone());
        Ok(())
    }

    async fn get_ticket(&self, tenant_id: TenantId, id: TicketId) -> Result<Option<Ticket>> {
        Ok(self
            .tables
            .read()
            .tickets
            .get(&id)
            .filter(|t| t.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_tickets(&self, tenant_id: TenantId, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        let tables = self.tables.read();
        let mut tickets: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| t.tenant_id == tenant_id && filter.matches(t))
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(tickets)
    }

    async fn insert_message(&self, message: &TicketMessage, activity: &TicketActivity) -> Result<()> {
        let mut tables = self.tables.write();
        if !owns(&tables, message.tenant_id, message.ticket_id) {
            return Err(SarafiError::not_found("ticket", message.ticket_id));
        }
        tables.messages.push(message.clone());
        tables.activity.push(activity.clone());
        Ok(())
    }

    async fn list_messages(
        &self,
        tenant_id: TenantId,
        ticket_id: TicketId,
        include_internal: bool,
    ) -> Result<Vec<TicketMessage>> {
        Ok(self
            .tables
            .read()
            .messages
            .iter()
            .filter(|m| m.tenant_id == tenant_id && m.ticket_id == ticket_id)
            .filter(|m| include_internal || !m.is_internal)
            .cloned()
            .collect())
    }

    async fn list_activity(&self, tenant_id: TenantId, ticket_id: TicketId) -> Result<Vec<TicketActivity>> {
        Ok(self
            .tables
            .read()
            .activity
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.ticket_id == ticket_id)
            .cloned()
            .collect())
    }
}
