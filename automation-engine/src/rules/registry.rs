use std::collections::HashMap;

use parking_lot::RwLock;
use shared::{CoreError, CoreResult, Rule, SavedFilter, Trigger};
use tracing::info;

/// In-memory store for rules and saved filters.
///
/// Every write path runs the payload's `validate()` before it lands,
/// so anything readable from the registry is structurally sound and
/// type-checked. Reads hand out clones; the engine never holds a lock
/// across an await point.
#[derive(Default)]
pub struct RuleRegistry {
    rules: RwLock<HashMap<String, Rule>>,
    filters: RwLock<HashMap<String, SavedFilter>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a rule. Rejects invalid payloads without
    /// touching the stored copy.
    pub fn save_rule(&self, rule: Rule) -> CoreResult<()> {
        rule.validate()?;
        let mut rules = self.rules.write();
        let replaced = rules.insert(rule.id.clone(), rule).is_some();
        if replaced {
            info!(event = "rule_replaced", "rule updated");
        }
        Ok(())
    }

    /// Load rules from a persisted snapshot without re-validation.
    ///
    /// A snapshot written by an older build can hold conditions that no
    /// longer type-check; those are quarantined by the engine on first
    /// use instead of rejecting the whole snapshot here.
    pub fn restore_rules(&self, rules: Vec<Rule>) {
        let mut map = self.rules.write();
        for rule in rules {
            map.insert(rule.id.clone(), rule);
        }
    }

    pub fn get_rule(&self, rule_id: &str) -> Option<Rule> {
        self.rules.read().get(rule_id).cloned()
    }

    pub fn delete_rule(&self, rule_id: &str) -> CoreResult<()> {
        self.rules
            .write()
            .remove(rule_id)
            .map(|_| ())
            .ok_or_else(|| CoreError::RuleNotFound(rule_id.to_string()))
    }

    /// Flip `enabled` off in place. Used by the engine to quarantine a
    /// rule whose condition stopped type-checking against live data.
    pub fn disable_rule(&self, rule_id: &str) -> CoreResult<()> {
        let mut rules = self.rules.write();
        let rule = rules
            .get_mut(rule_id)
            .ok_or_else(|| CoreError::RuleNotFound(rule_id.to_string()))?;
        rule.enabled = false;
        Ok(())
    }

    pub fn list_rules(&self) -> Vec<Rule> {
        let mut out: Vec<Rule> = self.rules.read().values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Enabled rules whose trigger matches, ordered by descending
    /// priority with rule id as the tie-breaker. This is the firing
    /// order the engine walks.
    pub fn matching(&self, trigger: Trigger) -> Vec<Rule> {
        let mut out: Vec<Rule> = self
            .rules
            .read()
            .values()
            .filter(|r| r.enabled && r.matches_trigger(trigger))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub fn save_filter(&self, filter: SavedFilter) -> CoreResult<()> {
        filter.validate()?;
        self.filters.write().insert(filter.id.clone(), filter);
        Ok(())
    }

    pub fn get_filter(&self, filter_id: &str) -> Option<SavedFilter> {
        self.filters.read().get(filter_id).cloned()
    }

    pub fn delete_filter(&self, filter_id: &str) -> CoreResult<()> {
        self.filters
            .write()
            .remove(filter_id)
            .map(|_| ())
            .ok_or_else(|| CoreError::Validation(format!("unknown filter: {filter_id}")))
    }

    pub fn list_filters(&self) -> Vec<SavedFilter> {
        let mut out: Vec<SavedFilter> = self.filters.read().values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}
