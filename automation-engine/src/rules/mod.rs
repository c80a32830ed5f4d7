//! Rule authoring and execution
//!
//! [`RuleRegistry`] is the authoring surface (CRUD with save-time
//! validation); [`RuleEngine`] is the event-consumption path.

mod engine;
mod registry;

pub use engine::RuleEngine;
pub use registry::RuleRegistry;
