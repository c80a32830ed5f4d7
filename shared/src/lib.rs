//! Shared types for the ticket automation kernel
//!
//! Domain models used across the engine crates: tickets and their status
//! state machine, SLA policies, rules and actions, the predicate expression
//! tree, execution records, and the error taxonomy.

pub mod error;
pub mod event;
pub mod models;
pub mod predicate;
pub mod util;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use event::{TicketEvent, TicketEventKind};
pub use models::{
    Action, ActionOutcome, ActionStatus, DeadlineKind, ExecutionRecord, Outcome, Priority, Rule,
    SavedFilter, SkipReason, SlaPolicy, Ticket, TicketStatus, Trigger,
};
pub use predicate::{Field, Operator, Predicate, Value};
