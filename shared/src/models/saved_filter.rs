//! Saved Filter Model
//!
//! Operator-authored ticket list filters. Share the predicate model (and
//! its save-time type checking) with rule conditions.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::predicate::Predicate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedFilter {
    pub id: String,
    pub name: String,
    pub predicate: Predicate,
}

impl SavedFilter {
    pub fn new(id: impl Into<String>, name: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            predicate,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.id.trim().is_empty() {
            return Err(CoreError::Validation(
                "saved filter id must not be empty".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation(
                "saved filter name must not be empty".to_string(),
            ));
        }
        self.predicate.validate()
    }
}
