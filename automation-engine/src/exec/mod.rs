//! Action execution
//!
//! Bounded worker pool running ordered action chains, strictly serialized
//! per ticket.

mod executor;

pub use executor::ActionExecutor;
