use std::collections::BTreeSet;

use shared::{DeadlineKind, SlaPolicy};

/// Per-ticket deadline state.
///
/// Deadlines are derived, never stored: each one is `anchor + budget`.
/// The anchor is creation time for new tickets and reopen time after a
/// reopen. `fired` records which deadlines have already produced their
/// event; recomputing after a policy or department change moves the
/// pending due times but never resurrects a fired deadline.
#[derive(Debug, Clone)]
pub struct SlaClock {
    anchor: i64,
    policy: SlaPolicy,
    /// Issued by the scheduler, unique across every clock it has ever
    /// created. Heap entries carry the value they were pushed under, so
    /// entries from a recompute or an earlier life of the same ticket
    /// fall out on pop.
    generation: u64,
    fired: BTreeSet<DeadlineKind>,
}

impl SlaClock {
    pub fn new(anchor: i64, policy: SlaPolicy, generation: u64) -> Self {
        Self {
            anchor,
            policy,
            generation,
            fired: BTreeSet::new(),
        }
    }

    pub fn anchor(&self) -> i64 {
        self.anchor
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn due_at(&self, kind: DeadlineKind) -> i64 {
        self.anchor + self.policy.budget_for(kind)
    }

    pub fn is_fired(&self, kind: DeadlineKind) -> bool {
        self.fired.contains(&kind)
    }

    pub fn mark_fired(&mut self, kind: DeadlineKind) {
        self.fired.insert(kind);
    }

    pub fn all_fired(&self) -> bool {
        self.fired.len() == DeadlineKind::ALL.len()
    }

    /// Deadlines that still need a heap entry.
    pub fn pending_kinds(&self) -> Vec<DeadlineKind> {
        DeadlineKind::ALL
            .into_iter()
            .filter(|k| !self.fired.contains(k))
            .collect()
    }

    /// Re-anchor and/or swap the policy under a fresh generation. Fired
    /// deadlines stay fired.
    pub fn recompute(&mut self, anchor: i64, policy: SlaPolicy, generation: u64) {
        self.anchor = anchor;
        self.policy = policy;
        self.generation = generation;
    }
}
