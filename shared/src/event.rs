//! Ticket Events
//!
//! Events flowing from the ticket lifecycle service and the SLA scheduler
//! into the rule engine. Deadline expirations travel through the same type
//! so escalation rules match uniformly with state-change events.

use serde::{Deserialize, Serialize};

use crate::models::{DeadlineKind, TicketStatus, Trigger};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketEventKind {
    Created,
    Updated {
        from: TicketStatus,
        to: TicketStatus,
    },
    /// Synthetic event emitted by the SLA scheduler
    DeadlineElapsed(DeadlineKind),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketEvent {
    pub ticket_id: String,
    pub kind: TicketEventKind,
    /// Event timestamp (Unix millis)
    pub at: i64,
    /// Operator behind the change, None for system events
    pub operator: Option<String>,
}

impl TicketEvent {
    pub fn created(ticket_id: impl Into<String>, at: i64) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            kind: TicketEventKind::Created,
            at,
            operator: None,
        }
    }

    pub fn updated(
        ticket_id: impl Into<String>,
        from: TicketStatus,
        to: TicketStatus,
        at: i64,
    ) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            kind: TicketEventKind::Updated { from, to },
            at,
            operator: None,
        }
    }

    pub fn deadline_elapsed(ticket_id: impl Into<String>, kind: DeadlineKind, at: i64) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            kind: TicketEventKind::DeadlineElapsed(kind),
            at,
            operator: None,
        }
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    /// The trigger kind this event matches against.
    pub fn trigger(&self) -> Trigger {
        match &self.kind {
            TicketEventKind::Created => Trigger::TicketCreated,
            TicketEventKind::Updated { .. } => Trigger::TicketUpdated,
            TicketEventKind::DeadlineElapsed(kind) => Trigger::DeadlineElapsed(*kind),
        }
    }
}
