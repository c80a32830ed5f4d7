//! Unified error taxonomy for the automation kernel
//!
//! Every failure surfaced by the engine maps to one of these variants:
//!
//! | Variant | Meaning | Isolation |
//! |---------|---------|-----------|
//! | `Validation` | Bad rule/predicate/filter definition, rejected at authoring time | caller |
//! | `TypeMismatch` | Predicate built over an incompatible field/operator/value combination | offending rule only |
//! | `InvalidTransition` | Illegal ticket status change, rejected with no side effects | caller |
//! | `ActionFailure` | A single action in a chain failed | offending chain only |
//! | `SchedulerOverload` | Executor queue ceiling exceeded, fatal | operators |
//!
//! Nothing in the engine swallows an error: failures either propagate as
//! `CoreError` or land in an execution record with a machine-readable
//! outcome.

use thiserror::Error;

use crate::models::TicketStatus;

/// Kernel error type
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Bad rule / filter / predicate definition, rejected at save time
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Operator applied to an incompatible field or value type.
    /// Raised at predicate construction, never at evaluation.
    #[error("Type mismatch: operator {operator} is not defined for field {field}")]
    TypeMismatch { field: String, operator: String },

    /// Illegal ticket status transition
    #[error("Invalid transition: {from:?} -> {to:?}")]
    InvalidTransition { from: TicketStatus, to: TicketStatus },

    /// A single action in a chain failed
    #[error("Action failed at index {index}: {reason}")]
    ActionFailure { index: usize, reason: String },

    /// Executor queue depth exceeded the configured ceiling
    #[error("Scheduler overload: queue depth {depth} exceeds ceiling {ceiling}")]
    SchedulerOverload { depth: usize, ceiling: usize },

    /// Ticket does not exist in the store
    #[error("Ticket not found: {0}")]
    TicketNotFound(String),

    /// Rule does not exist in the registry
    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    /// Ticket store backend failure
    #[error("Store error: {0}")]
    Store(String),

    /// Notifier backend failure
    #[error("Notify error: {0}")]
    Notify(String),

    /// Engine is shutting down, submission rejected
    #[error("Engine shutting down")]
    ShuttingDown,
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Stable machine-readable code for the audit feed.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "VALIDATION",
            CoreError::TypeMismatch { .. } => "TYPE_MISMATCH",
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::ActionFailure { .. } => "ACTION_FAILURE",
            CoreError::SchedulerOverload { .. } => "SCHEDULER_OVERLOAD",
            CoreError::TicketNotFound(_) => "TICKET_NOT_FOUND",
            CoreError::RuleNotFound(_) => "RULE_NOT_FOUND",
            CoreError::Store(_) => "STORE",
            CoreError::Notify(_) => "NOTIFY",
            CoreError::ShuttingDown => "SHUTTING_DOWN",
        }
    }
}
