//! Execution Record Model
//!
//! Append-only audit entry for one rule firing on one ticket. Records are
//! never rewritten except for the pending → terminal outcome transition;
//! the `Pending` pre-write is what makes at-most-once firing enforceable
//! across restarts.

use serde::{Deserialize, Serialize};

/// Outcome of a whole action chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Written before execution starts
    Pending,
    /// Chain started executing (phase marker for overlap auditing)
    InProgress,
    Completed,
    /// Action `failed_index` failed; earlier mutations are kept (forward-only)
    PartialFailure { failed_index: usize, reason: String },
    /// Rule matched but was not submitted
    Skipped { reason: SkipReason },
    /// Pending work found on startup, not resumed
    Aborted,
}

/// Machine-readable skip reason
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    /// A firing for (ticket, rule) exists inside the cooldown window
    Cooldown,
    /// Condition evaluation failed; the rule was disabled
    ConditionError(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Cooldown => write!(f, "cooldown"),
            SkipReason::ConditionError(e) => write!(f, "condition error: {}", e),
        }
    }
}

/// Per-action result inside a chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Applied,
    Failed { reason: String },
    /// Chain halted before reaching this action
    NotAttempted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionOutcome {
    pub index: usize,
    /// Action kind name (`set_status`, `send_message`, ...)
    pub action: String,
    pub status: ActionStatus,
    /// Attempts consumed (retryable actions may use several)
    pub attempts: u32,
}

/// One rule firing on one ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Snowflake-style id, time-ordered
    pub id: i64,
    pub ticket_id: String,
    pub rule_id: String,
    /// Submission timestamp (Unix millis)
    pub fired_at: i64,
    pub outcome: Outcome,
    pub action_outcomes: Vec<ActionOutcome>,
    /// Execution start, set when the chain leaves Pending
    pub started_at: Option<i64>,
    /// Terminal outcome timestamp
    pub finished_at: Option<i64>,
}

impl ExecutionRecord {
    /// The pre-write: a Pending record with no action outcomes yet.
    pub fn pending(
        id: i64,
        ticket_id: impl Into<String>,
        rule_id: impl Into<String>,
        fired_at: i64,
    ) -> Self {
        Self {
            id,
            ticket_id: ticket_id.into(),
            rule_id: rule_id.into(),
            fired_at,
            outcome: Outcome::Pending,
            action_outcomes: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    /// A skip entry is terminal at creation.
    pub fn skipped(
        id: i64,
        ticket_id: impl Into<String>,
        rule_id: impl Into<String>,
        fired_at: i64,
        reason: SkipReason,
    ) -> Self {
        Self {
            id,
            ticket_id: ticket_id.into(),
            rule_id: rule_id.into(),
            fired_at,
            outcome: Outcome::Skipped { reason },
            action_outcomes: Vec::new(),
            started_at: None,
            finished_at: Some(fired_at),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.outcome, Outcome::Pending | Outcome::InProgress)
    }
}
