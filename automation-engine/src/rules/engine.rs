use std::sync::Arc;

use shared::{CoreError, CoreResult, ExecutionRecord, SkipReason, TicketEvent};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::exec::ActionExecutor;
use crate::filter;
use crate::records::RecordStore;
use crate::rules::RuleRegistry;
use crate::store::TicketStore;

/// Consumes ticket events and turns them into action chains.
///
/// For each event the engine walks the matching rules in registry order
/// (priority desc, id asc), evaluates conditions against the current
/// ticket snapshot, pre-writes an execution record under the cooldown
/// lock, and hands the chain to the executor. The engine itself never
/// mutates tickets; only action chains do.
pub struct RuleEngine {
    registry: Arc<RuleRegistry>,
    store: Arc<dyn TicketStore>,
    records: Arc<RecordStore>,
    executor: Arc<ActionExecutor>,
    clock: Arc<dyn Clock>,
}

impl RuleEngine {
    pub fn new(
        registry: Arc<RuleRegistry>,
        store: Arc<dyn TicketStore>,
        records: Arc<RecordStore>,
        executor: Arc<ActionExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            store,
            records,
            executor,
            clock,
        }
    }

    /// Replay recovery: fold any non-terminal records left over from a
    /// previous run into `Aborted`. Call once before consuming events.
    pub fn recover(&self) -> usize {
        let aborted = self.records.recover_pending(self.clock.now_millis());
        if aborted > 0 {
            warn!(aborted, "recovered interrupted chains as aborted");
        }
        aborted
    }

    /// Process one ticket event. Returns the execution records written
    /// for it (fired and skipped both), in firing order.
    pub async fn on_event(&self, event: &TicketEvent) -> Vec<ExecutionRecord> {
        let candidates = self.registry.matching(event.trigger());
        if candidates.is_empty() {
            return Vec::new();
        }

        let ticket = match self.store.get(&event.ticket_id).await {
            Ok(ticket) => ticket,
            Err(err) => {
                warn!(
                    ticket_id = %event.ticket_id,
                    error = %err,
                    "dropping event for unloadable ticket"
                );
                return Vec::new();
            }
        };

        let now = self.clock.now_millis();
        let mut written = Vec::new();
        for rule in candidates {
            if let Some(condition) = &rule.condition {
                // Conditions type-check at save time, but a rule loaded
                // from a snapshot can go stale against live data. A broken
                // condition quarantines that one rule and leaves the rest
                // of the chain walk untouched.
                if let Err(err) = condition.validate() {
                    warn!(rule_id = %rule.id, error = %err, "condition no longer type-checks, disabling rule");
                    let _ = self.registry.disable_rule(&rule.id);
                    written.push(self.records.append_skip(
                        &event.ticket_id,
                        &rule.id,
                        now,
                        SkipReason::ConditionError(err.to_string()),
                    ));
                    continue;
                }
                if !filter::evaluate(condition, &ticket) {
                    debug!(rule_id = %rule.id, ticket_id = %ticket.id, "condition not met");
                    continue;
                }
            }
            written.push(self.fire(&event.ticket_id, &rule, now));
        }
        written
    }

    /// Operator-invoked firing. Honors the rule's condition and cooldown
    /// exactly like the event path; the only difference is that `Manual`
    /// rules are reachable here and nowhere else.
    pub async fn run_rule(&self, rule_id: &str, ticket_id: &str) -> CoreResult<ExecutionRecord> {
        let rule = self
            .registry
            .get_rule(rule_id)
            .ok_or_else(|| CoreError::RuleNotFound(rule_id.to_string()))?;
        if !rule.enabled {
            return Err(CoreError::Validation(format!("rule disabled: {rule_id}")));
        }
        let ticket = self.store.get(ticket_id).await?;
        let now = self.clock.now_millis();
        if let Some(condition) = &rule.condition {
            condition.validate()?;
            if !filter::evaluate(condition, &ticket) {
                return Err(CoreError::Validation(format!(
                    "condition not met for ticket {ticket_id}"
                )));
            }
        }
        Ok(self.fire(ticket_id, &rule, now))
    }

    fn fire(&self, ticket_id: &str, rule: &shared::Rule, now: i64) -> ExecutionRecord {
        match self
            .records
            .try_begin(ticket_id, &rule.id, rule.cooldown_ms, now)
        {
            Ok(pending) => {
                info!(rule_id = %rule.id, ticket_id = %ticket_id, record_id = pending.id, "rule fired");
                if let Err(err) =
                    self.executor
                        .submit(pending.id, ticket_id, &rule.id, rule.actions.clone())
                {
                    // Overload: submit already finalized the record as
                    // Aborted, re-read it so the caller sees the truth.
                    warn!(rule_id = %rule.id, error = %err, "chain rejected at submit");
                    return self.records.get(pending.id).unwrap_or(pending);
                }
                pending
            }
            Err(reason) => {
                debug!(rule_id = %rule.id, ticket_id = %ticket_id, %reason, "firing skipped");
                self.records.append_skip(ticket_id, &rule.id, now, reason)
            }
        }
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }
}
