//! Sarafi support tickets.
//!
//! Tickets move `open -> in_progress -> waiting_customer -> resolved`, carry
//! internal and external messages, and keep an append-only activity log.

pub mod memory;
pub mod postgres;
pub mod service;
pub mod store;
pub mod ticket;

pub use memory::InMemoryTicketStore;
pub use postgres::PgTicketStore;
pub use service::TicketService;
pub use store::TicketStore;
pub use ticket::{
    ActivityAction, NewTicket, Ticket, TicketActivity, TicketFilter, TicketMessage, TicketPriority,
    TicketStatus,
};
