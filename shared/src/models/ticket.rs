//! Ticket Model
//!
//! Canonical support case entity plus the status state machine.
//!
//! Allowed transitions:
//!
//! ```text
//! New → InProgress → Waiting ⇄ InProgress → Resolved → Closed
//!                                           Resolved → InProgress (reopen)
//!                                           Closed   → InProgress (reopen, audited)
//! ```
//!
//! `first_response_at` and `resolved_at` are monotonic: once set they never
//! change, including across reopen.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Ticket status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    New,
    InProgress,
    Waiting,
    Resolved,
    Closed,
}

impl TicketStatus {
    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (New, InProgress)
                | (InProgress, Waiting)
                | (InProgress, Resolved)
                | (Waiting, InProgress)
                | (Resolved, Closed)
                | (Resolved, InProgress)
                | (Closed, InProgress)
        )
    }

    /// Resolved/Closed tickets have no SLA obligations.
    pub fn is_sla_terminal(self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }

    /// Reopening from Closed is allowed but flagged for the audit feed.
    pub fn is_audited_reopen(self, next: TicketStatus) -> bool {
        self == TicketStatus::Closed && next == TicketStatus::InProgress
    }
}

/// Ticket priority enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Numeric rank for ordering comparisons in predicates.
    pub fn rank(self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }
}

/// Support case entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Opaque unique id
    pub id: String,
    pub status: TicketStatus,
    pub priority: Priority,
    /// Creation timestamp (Unix millis)
    pub created_at: i64,
    /// First agent reply timestamp, monotonic once set
    pub first_response_at: Option<i64>,
    /// Resolution timestamp, monotonic once set
    pub resolved_at: Option<i64>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Exactly one department at a time
    pub department: String,
    #[serde(default)]
    pub assignees: BTreeSet<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, serde_json::Value>,
}

impl Ticket {
    pub fn new(
        id: impl Into<String>,
        department: impl Into<String>,
        priority: Priority,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            status: TicketStatus::New,
            priority,
            created_at,
            first_response_at: None,
            resolved_at: None,
            tags: BTreeSet::new(),
            department: department.into(),
            assignees: BTreeSet::new(),
            custom_fields: BTreeMap::new(),
        }
    }

    /// Apply a status transition, enforcing the state machine.
    ///
    /// Rejects illegal transitions with `InvalidTransition` and leaves the
    /// ticket untouched. Sets `resolved_at` on the first entry into
    /// Resolved only.
    pub fn apply_transition(&mut self, next: TicketStatus, now: i64) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next == TicketStatus::Resolved && self.resolved_at.is_none() {
            self.resolved_at = Some(now);
        }
        Ok(())
    }

    /// Record the first agent response. No-op when already set.
    pub fn record_first_response(&mut self, now: i64) {
        if self.first_response_at.is_none() {
            self.first_response_at = Some(now);
        }
    }
}
