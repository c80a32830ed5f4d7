//! SLA Policy Model

use serde::{Deserialize, Serialize};

/// Kind of SLA deadline tracked per ticket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadlineKind {
    Response,
    Resolution,
    Escalation,
}

impl DeadlineKind {
    pub const ALL: [DeadlineKind; 3] = [
        DeadlineKind::Response,
        DeadlineKind::Resolution,
        DeadlineKind::Escalation,
    ];
}

impl std::fmt::Display for DeadlineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeadlineKind::Response => write!(f, "response"),
            DeadlineKind::Resolution => write!(f, "resolution"),
            DeadlineKind::Escalation => write!(f, "escalation"),
        }
    }
}

/// Immutable SLA configuration bound to a department.
///
/// Budgets are durations in milliseconds, counted from ticket creation
/// (or reopen) time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlaPolicy {
    pub department: String,
    pub response_budget_ms: i64,
    pub resolution_budget_ms: i64,
    pub escalation_budget_ms: i64,
}

impl SlaPolicy {
    pub fn new(
        department: impl Into<String>,
        response_budget_ms: i64,
        resolution_budget_ms: i64,
        escalation_budget_ms: i64,
    ) -> Self {
        Self {
            department: department.into(),
            response_budget_ms,
            resolution_budget_ms,
            escalation_budget_ms,
        }
    }

    pub fn budget_for(&self, kind: DeadlineKind) -> i64 {
        match kind {
            DeadlineKind::Response => self.response_budget_ms,
            DeadlineKind::Resolution => self.resolution_budget_ms,
            DeadlineKind::Escalation => self.escalation_budget_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_lookup_matches_fields() {
        let p = SlaPolicy::new("support", 1, 2, 3);
        assert_eq!(p.budget_for(DeadlineKind::Response), 1);
        assert_eq!(p.budget_for(DeadlineKind::Resolution), 2);
        assert_eq!(p.budget_for(DeadlineKind::Escalation), 3);
    }
}
