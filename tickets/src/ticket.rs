//! Ticket aggregate: tickets, messages and the activity log.

use chrono::{DateTime, Utc};
use sarafi_common::{
    ActivityId, BranchId, CustomerId, Result, SarafiError, TenantId, TicketId, TicketMessageId,
    UserId,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ticket status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Newly raised, nobody working on it.
    Open,
    /// An agent is working on it.
    InProgress,
    /// Blocked on the customer.
    WaitingCustomer,
    /// Closed with resolution notes.
    Resolved,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 4] = [
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::WaitingCustomer,
        TicketStatus::Resolved,
    ];

    /// Get valid next states from current state.
    pub fn valid_transitions(&self) -> &[TicketStatus] {
        match self {
            TicketStatus::Open => &[
                TicketStatus::InProgress,
                TicketStatus::WaitingCustomer,
                TicketStatus::Resolved,
            ],
            TicketStatus::InProgress => &[TicketStatus::WaitingCustomer, TicketStatus::Resolved],
            TicketStatus::WaitingCustomer => &[TicketStatus::InProgress, TicketStatus::Resolved],
            TicketStatus::Resolved => &[TicketStatus::Open],
        }
    }

    /// Check if transition to given state is valid.
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::WaitingCustomer => "waiting_customer",
            TicketStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = SarafiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(TicketStatus::Open),
            "in_progress" => Ok(TicketStatus::InProgress),
            "waiting_customer" => Ok(TicketStatus::WaitingCustomer),
            "resolved" => Ok(TicketStatus::Resolved),
            other => Err(SarafiError::invalid_field(
                "status",
                format!("unknown ticket status '{}'", other),
            )),
        }
    }
}

/// Ticket priority. Independent of status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Medium => "medium",
            TicketPriority::High => "high",
            TicketPriority::Critical => "critical",
        }
    }
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketPriority {
    type Err = SarafiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(TicketPriority::Low),
            "medium" => Ok(TicketPriority::Medium),
            "high" => Ok(TicketPriority::High),
            "critical" => Ok(TicketPriority::Critical),
            other => Err(SarafiError::invalid_field(
                "priority",
                format!("unknown ticket priority '{}'", other),
            )),
        }
    }
}

/// A support ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub tenant_id: TenantId,
    pub branch_id: Option<BranchId>,
    pub customer_id: Option<CustomerId>,
    pub subject: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub assigned_to: Option<UserId>,
    pub created_by: UserId,
    /// Present exactly when the ticket is resolved.
    pub resolution_notes: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Bumped on every write; stale writers get `SarafiError::Conflict`.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Move to `next`, or fail if the table does not allow it.
    pub fn transition_to(&mut self, next: TicketStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SarafiError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }

        self.status = next;
        let now = Utc::now();
        self.updated_at = now;
        match next {
            TicketStatus::Resolved => self.resolved_at = Some(now),
            TicketStatus::Open => {
                self.resolved_at = None;
                self.resolution_notes = None;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Input for raising a ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTicket {
    pub tenant_id: TenantId,
    pub branch_id: Option<BranchId>,
    pub customer_id: Option<CustomerId>,
    pub subject: String,
    pub description: String,
    #[serde(default)]
    pub priority: TicketPriority,
}

/// A message on a ticket. Internal messages are staff-only notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketMessage {
    pub id: TicketMessageId,
    pub tenant_id: TenantId,
    pub ticket_id: TicketId,
    pub author_id: UserId,
    pub body: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

/// What an activity entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Created,
    Assigned,
    StatusChanged,
    PriorityChanged,
    MessageAdded,
    Resolved,
    Reopened,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Created => "created",
            ActivityAction::Assigned => "assigned",
            ActivityAction::StatusChanged => "status_changed",
            ActivityAction::PriorityChanged => "priority_changed",
            ActivityAction::MessageAdded => "message_added",
            ActivityAction::Resolved => "resolved",
            ActivityAction::Reopened => "reopened",
        }
    }
}

impl FromStr for ActivityAction {
    type Err = SarafiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(ActivityAction::Created),
            "assigned" => Ok(ActivityAction::Assigned),
            "status_changed" => Ok(ActivityAction::StatusChanged),
            "priority_changed" => Ok(ActivityAction::PriorityChanged),
            "message_added" => Ok(ActivityAction::MessageAdded),
            "resolved" => Ok(ActivityAction::Resolved),
            "reopened" => Ok(ActivityAction::Reopened),
            other => Err(SarafiError::invalid_field(
                "action",
                format!("unknown ticket action '{}'", other),
            )),
        }
    }
}

/// Append-only audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketActivity {
    pub id: ActivityId,
    pub tenant_id: TenantId,
    pub ticket_id: TicketId,
    pub actor_id: UserId,
    pub action: ActivityAction,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TicketActivity {
    pub fn new(ticket: &Ticket, actor_id: UserId, action: ActivityAction) -> Self {
        Self {
            id: ActivityId::new(),
            tenant_id: ticket.tenant_id,
            ticket_id: ticket.id,
            actor_id,
            action,
            old_value: None,
            new_value: None,
            created_at: Utc::now(),
        }
    }

    pub fn change(mut self, old: impl ToString, new: impl ToString) -> Self {
        self.old_value = Some(old.to_string());
        self.new_value = Some(new.to_string());
        self
    }

    pub fn value(mut self, new: impl ToString) -> Self {
        self.new_value = Some(new.to_string());
        self
    }
}

/// Listing filter; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub assigned_to: Option<UserId>,
}

impl TicketFilter {
    pub fn matches(&self, ticket: &Ticket) -> bool {
        self.status.map_or(true, |s| s == ticket.status)
            && self.priority.map_or(true, |p| p == ticket.priority)
            && self.assigned_to.map_or(true, |a| Some(a) == ticket.assigned_to)
    }
}
