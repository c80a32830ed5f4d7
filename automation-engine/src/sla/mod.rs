//! SLA deadline tracking
//!
//! One [`SlaClock`] per open ticket, all of them driven by a single
//! [`SlaScheduler`] task that walks a due-ordered heap. There is no
//! per-ticket timer or polling loop anywhere.

mod clock;
mod scheduler;

pub use clock::SlaClock;
pub use scheduler::{SchedulerCommand, SchedulerHandle, SlaScheduler};
