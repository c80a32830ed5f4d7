//! Data models
//!
//! Shared between the engine and any authoring/API surface.
//! Timestamps are Unix milliseconds (`i64`), durations are milliseconds.

pub mod execution_record;
pub mod rule;
pub mod saved_filter;
pub mod sla_policy;
pub mod ticket;

// Re-exports
pub use execution_record::*;
pub use rule::*;
pub use saved_filter::*;
pub use sla_policy::*;
pub use ticket::*;
