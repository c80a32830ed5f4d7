//! Audit / Observability feed
//!
//! Broadcast stream of execution records, fired deadlines, and audited
//! reopens, consumed by analytics/log surfaces outside the kernel.
//! Publishing never blocks the hot path; slow subscribers lag and are
//! reported by the broadcast channel itself.

use serde::Serialize;
use tokio::sync::broadcast;

use shared::models::{DeadlineKind, ExecutionRecord};

/// One entry on the observability feed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    /// A record was written or reached a terminal outcome
    RecordWritten(ExecutionRecord),
    /// The scheduler fired a deadline
    DeadlineFired {
        ticket_id: String,
        kind: DeadlineKind,
        fired_at: i64,
    },
    /// Closed → InProgress reopen, carries the operator
    TicketReopened {
        ticket_id: String,
        operator: Option<String>,
        at: i64,
    },
}

/// Cloneable handle around the broadcast sender.
#[derive(Debug, Clone)]
pub struct AuditFeed {
    tx: broadcast::Sender<AuditEvent>,
}

impl AuditFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.tx.subscribe()
    }

    /// Publish; a send error just means no subscribers, which is fine.
    pub fn publish(&self, event: AuditEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
