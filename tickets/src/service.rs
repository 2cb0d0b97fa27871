//! Ticket workflow service.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use sarafi_common::{Result, SarafiError, TenantId, TicketId, TicketMessageId, UserId};
use tracing::{info, instrument};

use crate::store::TicketStore;
use crate::ticket::{
    ActivityAction, NewTicket, Ticket, TicketActivity, TicketFilter, TicketMessage, TicketPriority,
    TicketStatus,
};

/// Drives tickets through their status workflow and keeps the activity log.
pub struct TicketService {
    store: Arc<dyn TicketStore>,
}

impl TicketService {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// Raise a ticket. New tickets are always open and unassigned.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id))]
    pub async fn create(&self, input: NewTicket, actor: UserId) -> Result<Ticket> {
        let subject = input.subject.trim();
        if subject.is_empty() {
            return Err(SarafiError::invalid_field("subject", "subject is required"));
        }

        let now = Utc::now();
        let ticket = Ticket {
            id: TicketId::new(),
            tenant_id: input.tenant_id,
            branch_id: input.branch_id,
            customer_id: input.customer_id,
            subject: subject.to_string(),
            description: input.description,
            status: TicketStatus::Open,
            priority: input.priority,
            assigned_to: None,
            created_by: actor,
            resolution_notes: None,
            resolved_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let activity = TicketActivity::new(&ticket, actor, ActivityAction::Created).value(ticket.priority);

        self.store.insert_ticket(&ticket, &activity).await?;
        info!(ticket_id = %ticket.id, priority = %ticket.priority, "Ticket created");
        Ok(ticket)
    }

    /// Write back a ticket read earlier. Fails with `SarafiError::Conflict`
    /// when another writer got there first; the caller re-reads and decides.
    async fn save(&self, ticket: &mut Ticket, activity: &TicketActivity) -> Result<()> {
        let expected = ticket.version;
        ticket.version += 1;
        self.store.update_ticket(ticket, expected, activity).await
    }

    pub async fn get(&self, tenant_id: TenantId, id: TicketId) -> Result<Ticket> {
        self.store
            .get_ticket(tenant_id, id)
            .await?
            .ok_or_else(|| SarafiError::not_found("ticket", id))
    }

    pub async fn list(&self, tenant_id: TenantId, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        self.store.list_tickets(tenant_id, filter).await
    }

    /// Assign to an agent. The ticket always ends up in progress.
    #[instrument(skip(self))]
    pub async fn assign(&self, tenant_id: TenantId, id: TicketId, assignee: UserId, actor: UserId) -> Result<Ticket> {
        let mut ticket = self.get(tenant_id, id).await?;
        if ticket.status == TicketStatus::Resolved {
            return Err(SarafiError::InvalidTransition {
                from: ticket.status.to_string(),
                to: TicketStatus::InProgress.to_string(),
            });
        }

        let previous = ticket.assigned_to;
        ticket.assigned_to = Some(assignee);
        if ticket.status != TicketStatus::InProgress {
            ticket.transition_to(TicketStatus::InProgress)?;
        }
        ticket.updated_at = Utc::now();

        let mut activity = TicketActivity::new(&ticket, actor, ActivityAction::Assigned).value(assignee);
        activity.old_value = previous.map(|u| u.to_string());

        self.save(&mut ticket, &activity).await?;
        info!(ticket_id = %id, assignee = %assignee, "Ticket assigned");
        Ok(ticket)
    }

    /// Move along the workflow. Resolution goes through [`Self::resolve`]
    /// because it needs notes.
    #[instrument(skip(self))]
    pub async fn change_status(
        &self,
        tenant_id: TenantId,
        id: TicketId,
        status: TicketStatus,
        actor: UserId,
    ) -> Result<Ticket> {
        if status == TicketStatus::Resolved {
            return Err(SarafiError::invalid_field(
                "status",
                "tickets are resolved with resolution notes, not a status change",
            ));
        }

        let mut ticket = self.get(tenant_id, id).await?;
        let previous = ticket.status;
        ticket.transition_to(status)?;

        let activity = TicketActivity::new(&ticket, actor, ActivityAction::StatusChanged).change(previous, status);
        self.save(&mut ticket, &activity).await?;
        info!(ticket_id = %id, from = %previous, to = %status, "Ticket status changed");
        Ok(ticket)
    }

    #[instrument(skip(self))]
    pub async fn change_priority(
        &self,
        tenant_id: TenantId,
        id: TicketId,
        priority: TicketPriority,
        actor: UserId,
    ) -> Result<Ticket> {
        let mut ticket = self.get(tenant_id, id).await?;
        let previous = ticket.priority;
        ticket.priority = priority;
        ticket.updated_at = Utc::now();

        let activity =
            TicketActivity::new(&ticket, actor, ActivityAction::PriorityChanged).change(previous, priority);
        self.save(&mut ticket, &activity).await?;
        info!(ticket_id = %id, from = %previous, to = %priority, "Ticket priority changed");
        Ok(ticket)
    }

    /// Post a message. Internal messages are hidden from customer-facing
    /// listings.
    #[instrument(skip(self, body))]
    pub async fn add_message(
        &self,
        tenant_id: TenantId,
        ticket_id: TicketId,
        author: UserId,
        body: &str,
        is_internal: bool,
    ) -> Result<TicketMessage> {
        let body = body.trim();
        if body.is_empty() {
            return Err(SarafiError::invalid_field("body", "message body is required"));
        }
        let ticket = self.get(tenant_id, ticket_id).await?;

        let message = TicketMessage {
            id: TicketMessageId::new(),
            tenant_id,
            ticket_id,
            author_id: author,
            body: body.to_string(),
            is_internal,
            created_at: Utc::now(),
        };
        let visibility = if is_internal { "internal" } else { "external" };
        let activity = TicketActivity::new(&ticket, author, ActivityAction::MessageAdded).value(visibility);

        self.store.insert_message(&message, &activity).await?;
        info!(ticket_id = %ticket_id, message_id = %message.id, is_internal, "Ticket message added");
        Ok(message)
    }

    pub async fn list_messages(
        &self,
        tenant_id: TenantId,
        ticket_id: TicketId,
        include_internal: bool,
    ) -> Result<Vec<TicketMessage>> {
        self.get(tenant_id, ticket_id).await?;
        self.store.list_messages(tenant_id, ticket_id, include_internal).await
    }

    /// Close the ticket with non-empty resolution notes.
    #[instrument(skip(self, notes))]
    pub async fn resolve(&self, tenant_id: TenantId, id: TicketId, notes: &str, actor: UserId) -> Result<Ticket> {
        let notes = notes.trim();
        if notes.is_empty() {
            return Err(SarafiError::invalid_field("resolution_notes", "resolution notes are required"));
        }

        let mut ticket = self.get(tenant_id, id).await?;
        let previous = ticket.status;
        ticket.transition_to(TicketStatus::Resolved)?;
        ticket.resolution_notes = Some(notes.to_string());

        let activity = TicketActivity::new(&ticket, actor, ActivityAction::Resolved)
            .change(previous, TicketStatus::Resolved);
        self.save(&mut ticket, &activity).await?;
        info!(ticket_id = %id, "Ticket resolved");
        Ok(ticket)
    }

    /// Reopen a resolved ticket, discarding its resolution.
    #[instrument(skip(self))]
    pub async fn reopen(&self, tenant_id: TenantId, id: TicketId, actor: UserId) -> Result<Ticket> {
        let mut ticket = self.get(tenant_id, id).await?;
        ticket.transition_to(TicketStatus::Open)?;

        let activity = TicketActivity::new(&ticket, actor, ActivityAction::Reopened)
            .change(TicketStatus::Resolved, TicketStatus::Open);
        self.save(&mut ticket, &activity).await?;
        info!(ticket_id = %id, "Ticket reopened");
        Ok(ticket)
    }

    pub async fn activity_log(&self, tenant_id: TenantId, id: TicketId) -> Result<Vec<TicketActivity>> {
        self.get(tenant_id, id).await?;
        self.store.list_activity(tenant_id, id).await
    }

    /// Ticket count per status, with every status present.
    pub async fn status_counts(&self, tenant_id: TenantId) -> Result<BTreeMap<TicketStatus, u64>> {
        let mut counts: BTreeMap<TicketStatus, u64> =
            TicketStatus::ALL.iter().map(|s| (*s, 0)).collect();
        counts.extend(self.store.status_counts(tenant_id).await?);
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTicketStore;

    fn service() -> TicketService {
        TicketService::new(Arc::new(InMemoryTicketStore::new()))
    }

    fn shared() -> (TicketService, Arc<InMemoryTicketStore>) {
        let store = Arc::new(InMemoryTicketStore::new());
        (TicketService::new(store.clone()), store)
    }

    fn new_ticket(tenant_id: TenantId) -> NewTicket {
        NewTicket {
            tenant_id,
            branch_id: None,
            customer_id: None,
            subject: "Remittance not received".to_string(),
            description: "Recipient reports nothing arrived after 3 days".to_string(),
            priority: TicketPriority::High,
        }
    }

    #[tokio::test]
    async fn test_create_is_open() {
        let service = service();
        let tenant = TenantId::new();
        let ticket = service.create(new_ticket(tenant), UserId::new()).await.unwrap();

        assert_eq!(ticket.status, TicketStatus::Open);
        assert!(ticket.assigned_to.is_none());

        let log = service.activity_log(tenant, ticket.id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, ActivityAction::Created);
    }

    #[tokio::test]
    async fn test_blank_subject_rejected() {
        let service = service();
        let mut input = new_ticket(TenantId::new());
        input.subject = "   ".to_string();
        assert!(service.create(input, UserId::new()).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_assign_moves_to_in_progress() {
        let service = service();
        let tenant = TenantId::new();
        let actor = UserId::new();
        let agent = UserId::new();
        let ticket = service.create(new_ticket(tenant), actor).await.unwrap();

        let ticket = service.assign(tenant, ticket.id, agent, actor).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::InProgress);
        assert_eq!(ticket.assigned_to, Some(agent));

        // From waiting_customer too.
        service
            .change_status(tenant, ticket.id, TicketStatus::WaitingCustomer, actor)
            .await
            .unwrap();
        let ticket = service.assign(tenant, ticket.id, UserId::new(), actor).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::InProgress);

        // Re-assigning while in progress keeps the status.
        let ticket = service.assign(tenant, ticket.id, agent, actor).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::InProgress);
    }

    #[tokio::test]
    async fn test_assign_resolved_rejected() {
        let service = service();
        let tenant = TenantId::new();
        let actor = UserId::new();
        let ticket = service.create(new_ticket(tenant), actor).await.unwrap();
        service.resolve(tenant, ticket.id, "Duplicate", actor).await.unwrap();

        let err = service.assign(tenant, ticket.id, UserId::new(), actor).await.unwrap_err();
        assert!(matches!(err, SarafiError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_resolve_requires_notes() {
        let service = service();
        let tenant = TenantId::new();
        let actor = UserId::new();
        let ticket = service.create(new_ticket(tenant), actor).await.unwrap();

        assert!(service.resolve(tenant, ticket.id, "  ", actor).await.is_err());

        let resolved = service
            .resolve(tenant, ticket.id, " Funds traced and delivered ", actor)
            .await
            .unwrap();
        assert_eq!(resolved.status, TicketStatus::Resolved);
        assert!(resolved.resolved_at.is_some());
        assert_eq!(resolved.resolution_notes.as_deref(), Some("Funds traced and delivered"));
    }

    #[tokio::test]
    async fn test_reopen_clears_resolution() {
        let service = service();
        let tenant = TenantId::new();
        let actor = UserId::new();
        let ticket = service.create(new_ticket(tenant), actor).await.unwrap();

        assert!(service.reopen(tenant, ticket.id, actor).await.is_err());

        service.resolve(tenant, ticket.id, "Fixed", actor).await.unwrap();
        let reopened = service.reopen(tenant, ticket.id, actor).await.unwrap();
        assert_eq!(reopened.status, TicketStatus::Open);
        assert!(reopened.resolved_at.is_none());
        assert!(reopened.resolution_notes.is_none());
    }

    #[tokio::test]
    async fn test_change_status_cannot_resolve() {
        let service = service();
        let tenant = TenantId::new();
        let actor = UserId::new();
        let ticket = service.create(new_ticket(tenant), actor).await.unwrap();

        let err = service
            .change_status(tenant, ticket.id, TicketStatus::Resolved, actor)
            .await
            .unwrap_err();
        assert!(err.is_validation());

        service
            .change_status(tenant, ticket.id, TicketStatus::InProgress, actor)
            .await
            .unwrap();
        let err = service
            .change_status(tenant, ticket.id, TicketStatus::Open, actor)
            .await
            .unwrap_err();
        assert!(matches!(err, SarafiError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_internal_messages_filtered() {
        let service = service();
        let tenant = TenantId::new();
        let actor = UserId::new();
        let ticket = service.create(new_ticket(tenant), actor).await.unwrap();

        service
            .add_message(tenant, ticket.id, actor, "We are looking into it", false)
            .await
            .unwrap();
        service
            .add_message(tenant, ticket.id, actor, "Correspondent says Tuesday", true)
            .await
            .unwrap();

        let public = service.list_messages(tenant, ticket.id, false).await.unwrap();
        assert_eq!(public.len(), 1);
        assert!(!public[0].is_internal);

        let all = service.list_messages(tenant, ticket.id, true).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_every_mutation_logs_once() {
        let service = service();
        let tenant = TenantId::new();
        let actor = UserId::new();
        let ticket = service.create(new_ticket(tenant), actor).await.unwrap();

        service.assign(tenant, ticket.id, UserId::new(), actor).await.unwrap();
        service
            .change_priority(tenant, ticket.id, TicketPriority::Critical, actor)
            .await
            .unwrap();
        service.add_message(tenant, ticket.id, actor, "Escalated", true).await.unwrap();
        service.resolve(tenant, ticket.id, "Resolved by ops", actor).await.unwrap();
        service.reopen(tenant, ticket.id, actor).await.unwrap();

        // Failed mutations leave no trace.
        assert!(service.resolve(tenant, ticket.id, "", actor).await.is_err());

        let actions: Vec<ActivityAction> = service
            .activity_log(tenant, ticket.id)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                ActivityAction::Created,
                ActivityAction::Assigned,
                ActivityAction::PriorityChanged,
                ActivityAction::MessageAdded,
                ActivityAction::Resolved,
                ActivityAction::Reopened,
            ]
        );
    }

    #[tokio::test]
    async fn test_tenant_isolation_and_counts() {
        let service = service();
        let tenant = TenantId::new();
        let actor = UserId::new();
        let a = service.create(new_ticket(tenant), actor).await.unwrap();
        service.create(new_ticket(tenant), actor).await.unwrap();
        service.resolve(tenant, a.id, "Done", actor).await.unwrap();

        assert!(matches!(
            service.get(TenantId::new(), a.id).await.unwrap_err(),
            SarafiError::NotFound { .. }
        ));

        let counts = service.status_counts(tenant).await.unwrap();
        assert_eq!(counts[&TicketStatus::Open], 1);
        assert_eq!(counts[&TicketStatus::Resolved], 1);
        assert_eq!(counts[&TicketStatus::InProgress], 0);

        let open = service
            .list(
                tenant,
                &TicketFilter {
                    status: Some(TicketStatus::Open),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let (service, store) = shared();
        let tenant = TenantId::new();
        let actor = UserId::new();
        let agent = UserId::new();
        let ticket = service.create(new_ticket(tenant), actor).await.unwrap();
        assert_eq!(ticket.version, 0);

        // A second agent read the ticket before the assignment landed.
        let mut stale = store.get_ticket(tenant, ticket.id).await.unwrap().unwrap();

        let assigned = service.assign(tenant, ticket.id, agent, actor).await.unwrap();
        assert_eq!(assigned.version, 1);

        let previous = stale.status;
        stale.transition_to(TicketStatus::Resolved).unwrap();
        stale.resolution_notes = Some("Closed from a stale view".to_string());
        stale.version += 1;
        let activity = TicketActivity::new(&stale, actor, ActivityAction::Resolved)
            .change(previous, TicketStatus::Resolved);
        let err = store.update_ticket(&stale, 0, &activity).await.unwrap_err();
        assert!(matches!(err, SarafiError::Conflict(_)));
        assert!(err.is_retryable());

        let current = service.get(tenant, ticket.id).await.unwrap();
        assert_eq!(current.status, TicketStatus::InProgress);
        assert_eq!(current.assigned_to, Some(agent));
        assert!(current.resolution_notes.is_none());

        let actions: Vec<ActivityAction> = service
            .activity_log(tenant, ticket.id)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.action)
            .collect();
        assert_eq!(actions, vec![ActivityAction::Created, ActivityAction::Assigned]);

        // Re-reading picks up the new version and the write goes through.
        let resolved = service.resolve(tenant, ticket.id, "Delivered", actor).await.unwrap();
        assert_eq!(resolved.version, 2);
    }
}
