//! Ticket Automation Engine
//!
//! Rule-driven automation kernel with SLA-based escalation. Rules watch
//! ticket state, fire action chains when conditions hold, and time-bound
//! service-level deadlines escalate exactly once.
//!
//! # Module structure
//!
//! ```text
//! automation-engine/src/
//! ├── config.rs      # Engine configuration
//! ├── logger.rs      # tracing setup
//! ├── tasks.rs       # Background task registry + graceful shutdown
//! ├── clock.rs       # Injectable time source
//! ├── store.rs       # TicketStore boundary + in-memory implementation
//! ├── notify.rs      # Notifier boundary + in-memory recorder
//! ├── filter.rs      # Predicate evaluation over tickets
//! ├── records.rs     # Append-only execution record store
//! ├── audit.rs       # Observability feed (broadcast)
//! ├── rules/         # Rule registry + rule engine
//! ├── sla/           # SLA clocks + deadline scheduler
//! ├── exec/          # Action executor (bounded pool, per-ticket serial)
//! └── service.rs     # AutomationService wiring
//! ```
//!
//! # Data flow
//!
//! ```text
//! ticket events ──► event pump ──► RuleEngine ──► ActionExecutor ──► store / notifier
//!                       ▲                               │
//!                 SlaScheduler ◄── clock registration ──┘ (via service)
//! ```

pub mod audit;
pub mod clock;
pub mod config;
pub mod exec;
pub mod filter;
pub mod logger;
pub mod notify;
pub mod records;
pub mod rules;
pub mod service;
pub mod sla;
pub mod store;
pub mod tasks;

// Re-export public surface
pub use audit::{AuditEvent, AuditFeed};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use exec::ActionExecutor;
pub use notify::{MemoryNotifier, Notifier};
pub use records::RecordStore;
pub use rules::{RuleEngine, RuleRegistry};
pub use service::AutomationService;
pub use sla::{SchedulerHandle, SlaClock, SlaScheduler};
pub use store::{MemoryTicketStore, TicketStore};
