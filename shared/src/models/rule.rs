//! Automation Rule Model
//!
//! A rule is the unit of automation: trigger + optional condition + ordered
//! action chain. Rules are authored by operators and executed by the rule
//! engine; [`Rule::validate`] rejects bad definitions at save time so they
//! never fail at runtime.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::models::{DeadlineKind, Priority, TicketStatus};
use crate::predicate::Predicate;

/// What causes a rule to be considered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trigger {
    TicketCreated,
    TicketUpdated,
    DeadlineElapsed(DeadlineKind),
    /// Operator-invoked only (macros); never matched against events
    Manual,
}

/// One step of an action chain.
///
/// Each action is idempotent when replayed with the same
/// (ticket_id, rule_id, action_index) key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    SetStatus(TicketStatus),
    SetPriority(Priority),
    /// Replace the assignee set with a single target agent
    Reassign(String),
    AddTag(String),
    SendMessage { channel: String, template_id: String },
    /// Reassign the ticket to a role principal (senior queue)
    Escalate { target_role: String },
    NotifyManager,
}

impl Action {
    /// Retryable actions are replay-safe sends. Mutating actions surface
    /// errors immediately: retrying them after a partial success could
    /// reapply a no-longer-valid state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Action::SendMessage { .. } | Action::NotifyManager)
    }

    /// Short name for logs and per-action outcomes.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::SetStatus(_) => "set_status",
            Action::SetPriority(_) => "set_priority",
            Action::Reassign(_) => "reassign",
            Action::AddTag(_) => "add_tag",
            Action::SendMessage { .. } => "send_message",
            Action::Escalate { .. } => "escalate",
            Action::NotifyManager => "notify_manager",
        }
    }
}

/// Automation rule entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub trigger: Trigger,
    /// Optional refinement evaluated against the current ticket
    pub condition: Option<Predicate>,
    /// Ordered, non-empty for enabled rules
    pub actions: Vec<Action>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Higher fires first; ties break by rule id ascending
    #[serde(default)]
    pub priority: i64,
    /// Minimum interval between firings on the same ticket
    #[serde(default)]
    pub cooldown_ms: Option<i64>,
}

fn default_true() -> bool {
    true
}

impl Rule {
    pub fn new(id: impl Into<String>, name: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            trigger,
            condition: None,
            actions: Vec::new(),
            enabled: true,
            priority: 0,
            cooldown_ms: None,
        }
    }

    pub fn with_condition(mut self, condition: Predicate) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_cooldown_ms(mut self, cooldown_ms: i64) -> Self {
        self.cooldown_ms = Some(cooldown_ms);
        self
    }

    /// Save-time validation: descriptive rejection instead of runtime
    /// failure.
    pub fn validate(&self) -> CoreResult<()> {
        if self.id.trim().is_empty() {
            return Err(CoreError::Validation("rule id must not be empty".to_string()));
        }
        if self.enabled && self.actions.is_empty() {
            return Err(CoreError::Validation(format!(
                "enabled rule '{}' must have at least one action",
                self.id
            )));
        }
        if let Some(cooldown) = self.cooldown_ms
            && cooldown <= 0
        {
            return Err(CoreError::Validation(format!(
                "rule '{}' cooldown must be positive, got {}",
                self.id, cooldown
            )));
        }
        if let Some(condition) = &self.condition {
            condition.validate()?;
        }
        Ok(())
    }

    /// Whether this rule should be considered for an event of `trigger`.
    pub fn matches_trigger(&self, trigger: Trigger) -> bool {
        // Manual rules only run through the explicit manual path.
        self.trigger != Trigger::Manual && self.trigger == trigger
    }
}
