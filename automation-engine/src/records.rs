//! Execution record store
//!
//! Append-only log of rule firings, the source of truth for at-most-once
//! enforcement:
//!
//! - `try_begin` atomically checks the cooldown window and pre-writes a
//!   `Pending` record, so concurrent duplicate events cannot both fire.
//! - `recover_pending` marks in-flight records found at startup as
//!   `Aborted` instead of silently re-firing them.
//!
//! Every write is mirrored onto the audit feed.

use std::collections::HashMap;

use parking_lot::Mutex;

use shared::error::{CoreError, CoreResult};
use shared::models::{ActionOutcome, ExecutionRecord, Outcome, SkipReason};
use shared::util::snowflake_id;

use crate::audit::{AuditEvent, AuditFeed};

#[derive(Default)]
struct Inner {
    records: Vec<ExecutionRecord>,
    index_by_id: HashMap<i64, usize>,
    /// (ticket_id, rule_id) -> last submission timestamp
    last_fired: HashMap<(String, String), i64>,
}

pub struct RecordStore {
    inner: Mutex<Inner>,
    audit: AuditFeed,
}

impl RecordStore {
    pub fn new(audit: AuditFeed) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            audit,
        }
    }

    /// Atomic cooldown check + `Pending` pre-write.
    ///
    /// Returns the pre-written record, or `Err(SkipReason::Cooldown)` when a
    /// firing for (ticket, rule) already exists inside the window. The
    /// check and the write happen under one lock, which is what makes the
    /// at-most-once property hold under concurrent duplicate events.
    pub fn try_begin(
        &self,
        ticket_id: &str,
        rule_id: &str,
        cooldown_ms: Option<i64>,
        now: i64,
    ) -> Result<ExecutionRecord, SkipReason> {
        let record = {
            let mut inner = self.inner.lock();
            let key = (ticket_id.to_string(), rule_id.to_string());
            if let (Some(window), Some(last)) = (cooldown_ms, inner.last_fired.get(&key))
                && now - last < window
            {
                return Err(SkipReason::Cooldown);
            }
            let record = ExecutionRecord::pending(snowflake_id(), ticket_id, rule_id, now);
            inner.last_fired.insert(key, now);
            let idx = inner.records.len();
            inner.index_by_id.insert(record.id, idx);
            inner.records.push(record.clone());
            record
        };
        self.audit.publish(AuditEvent::RecordWritten(record.clone()));
        Ok(record)
    }

    /// Append a terminal skip entry (cooldown, condition error).
    pub fn append_skip(
        &self,
        ticket_id: &str,
        rule_id: &str,
        now: i64,
        reason: SkipReason,
    ) -> ExecutionRecord {
        let record = ExecutionRecord::skipped(snowflake_id(), ticket_id, rule_id, now, reason);
        {
            let mut inner = self.inner.lock();
            let idx = inner.records.len();
            inner.index_by_id.insert(record.id, idx);
            inner.records.push(record.clone());
        }
        self.audit.publish(AuditEvent::RecordWritten(record.clone()));
        record
    }

    /// Mark a chain as started. The InProgress phase boundaries let the
    /// audit feed prove same-ticket chains never overlap.
    pub fn mark_in_progress(&self, record_id: i64, now: i64) {
        self.update(record_id, |r| {
            r.outcome = Outcome::InProgress;
            r.started_at = Some(now);
        });
    }

    /// Write the terminal outcome of a chain.
    pub fn finish(
        &self,
        record_id: i64,
        outcome: Outcome,
        action_outcomes: Vec<ActionOutcome>,
        now: i64,
    ) {
        self.update(record_id, |r| {
            r.outcome = outcome;
            r.action_outcomes = action_outcomes;
            r.finished_at = Some(now);
        });
    }

    /// Cancel a chain that has not started yet. Once a chain is
    /// InProgress it runs to completion; terminal records are immutable.
    pub fn cancel(&self, record_id: i64, now: i64) -> CoreResult<()> {
        let cancelled = {
            let mut inner = self.inner.lock();
            let Some(&idx) = inner.index_by_id.get(&record_id) else {
                return Err(CoreError::Validation(format!(
                    "unknown execution record: {record_id}"
                )));
            };
            let record = &mut inner.records[idx];
            if record.outcome != Outcome::Pending {
                return Err(CoreError::Validation(format!(
                    "only pending chains can be cancelled, record {record_id} is {:?}",
                    record.outcome
                )));
            }
            record.outcome = Outcome::Aborted;
            record.finished_at = Some(now);
            record.clone()
        };
        self.audit
            .publish(AuditEvent::RecordWritten(cancelled));
        Ok(())
    }

    /// Startup recovery: abort anything still in flight.
    ///
    /// Cooldown bookkeeping is intentionally kept, so an aborted firing is
    /// not silently retried from scratch inside its window.
    pub fn recover_pending(&self, now: i64) -> usize {
        let aborted: Vec<ExecutionRecord> = {
            let mut inner = self.inner.lock();
            inner
                .records
                .iter_mut()
                .filter(|r| !r.is_terminal())
                .map(|r| {
                    r.outcome = Outcome::Aborted;
                    r.finished_at = Some(now);
                    r.clone()
                })
                .collect()
        };
        for record in &aborted {
            tracing::warn!(
                target: "audit",
                record_id = record.id,
                ticket_id = %record.ticket_id,
                rule_id = %record.rule_id,
                "Aborted in-flight execution record on startup"
            );
            self.audit.publish(AuditEvent::RecordWritten(record.clone()));
        }
        aborted.len()
    }

    pub fn get(&self, record_id: i64) -> Option<ExecutionRecord> {
        let inner = self.inner.lock();
        inner
            .index_by_id
            .get(&record_id)
            .map(|&idx| inner.records[idx].clone())
    }

    /// Records for one ticket, in submission order.
    pub fn for_ticket(&self, ticket_id: &str) -> Vec<ExecutionRecord> {
        self.inner
            .lock()
            .records
            .iter()
            .filter(|r| r.ticket_id == ticket_id)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<ExecutionRecord> {
        self.inner.lock().records.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    fn update(&self, record_id: i64, f: impl FnOnce(&mut ExecutionRecord)) {
        let updated = {
            let mut inner = self.inner.lock();
            let Some(&idx) = inner.index_by_id.get(&record_id) else {
                tracing::error!(target: "audit", record_id, "Update for unknown execution record");
                return;
            };
            let record = &mut inner.records[idx];
            f(record);
            record.clone()
        };
        self.audit.publish(AuditEvent::RecordWritten(updated));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RecordStore {
        RecordStore::new(AuditFeed::new(64))
    }

    #[test]
    fn cooldown_blocks_second_begin_inside_window() {
        let s = store();
        s.try_begin("tkt", "rule", Some(1_000), 10_000).unwrap();
        let err = s.try_begin("tkt", "rule", Some(1_000), 10_500).unwrap_err();
        assert_eq!(err, SkipReason::Cooldown);
        // Window elapsed
        s.try_begin("tkt", "rule", Some(1_000), 11_100).unwrap();
    }

    #[test]
    fn cooldown_is_per_ticket_and_rule() {
        let s = store();
        s.try_begin("tkt-1", "rule", Some(1_000), 10_000).unwrap();
        s.try_begin("tkt-2", "rule", Some(1_000), 10_000).unwrap();
        s.try_begin("tkt-1", "other", Some(1_000), 10_000).unwrap();
    }

    #[test]
    fn concurrent_duplicate_begins_yield_one_record() {
        use std::sync::Arc;
        let s = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = s.clone();
                std::thread::spawn(move || s.try_begin("tkt", "rule", Some(60_000), 10_000).is_ok())
            })
            .collect();
        let fired = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(fired, 1);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn recover_marks_pending_aborted_and_keeps_cooldown() {
        let s = store();
        let rec = s.try_begin("tkt", "rule", Some(60_000), 10_000).unwrap();
        assert_eq!(s.recover_pending(11_000), 1);
        let rec = s.get(rec.id).unwrap();
        assert_eq!(rec.outcome, Outcome::Aborted);
        // Still inside the window: not re-fired from scratch
        assert!(s.try_begin("tkt", "rule", Some(60_000), 12_000).is_err());
    }

    #[test]
    fn finish_writes_terminal_outcome() {
        let s = store();
        let rec = s.try_begin("tkt", "rule", None, 10_000).unwrap();
        s.mark_in_progress(rec.id, 10_001);
        s.finish(rec.id, Outcome::Completed, vec![], 10_002);
        let rec = s.get(rec.id).unwrap();
        assert_eq!(rec.outcome, Outcome::Completed);
        assert_eq!(rec.started_at, Some(10_001));
        assert_eq!(rec.finished_at, Some(10_002));
    }

    #[test]
    fn cancel_only_applies_to_pending_records() {
        let s = store();
        let rec = s.try_begin("tkt", "rule", None, 10_000).unwrap();
        s.cancel(rec.id, 10_001).unwrap();
        assert_eq!(s.get(rec.id).unwrap().outcome, Outcome::Aborted);

        let rec = s.try_begin("tkt", "other", None, 10_002).unwrap();
        s.mark_in_progress(rec.id, 10_003);
        assert!(s.cancel(rec.id, 10_004).is_err());
        assert!(s.cancel(9_999_999, 10_005).is_err());
    }

    #[test]
    fn for_ticket_preserves_submission_order() {
        let s = store();
        let a = s.try_begin("tkt", "r1", None, 1).unwrap();
        let b = s.try_begin("tkt", "r2", None, 2).unwrap();
        s.append_skip("tkt", "r3", 3, SkipReason::Cooldown);
        let ids: Vec<i64> = s.for_ticket("tkt").iter().map(|r| r.id).collect();
        assert_eq!(ids[0], a.id);
        assert_eq!(ids[1], b.id);
        assert_eq!(ids.len(), 3);
    }
}
