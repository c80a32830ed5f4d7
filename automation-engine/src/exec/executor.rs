//! Action Executor
//!
//! Runs the action chain of a matched rule against one ticket.
//!
//! # Guarantees
//!
//! - Chains for the same ticket never run concurrently (per-ticket async
//!   mutex); chains for different tickets run in parallel up to the worker
//!   pool bound.
//! - Within a chain, actions run in list order. The first failure halts the
//!   chain with `PartialFailure`; earlier mutations stay applied. Nothing
//!   is rolled back; a sent customer message cannot be unsent.
//! - Retryable actions (SendMessage, NotifyManager) get bounded retries
//!   with exponential backoff. Mutating actions surface errors immediately.
//! - Submissions past the global queue ceiling fail fatally with
//!   `SchedulerOverload` instead of queueing unbounded.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;

use shared::error::{CoreError, CoreResult};
use shared::event::TicketEvent;
use shared::models::{Action, ActionOutcome, ActionStatus, Outcome};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::notify::Notifier;
use crate::records::RecordStore;
use crate::store::TicketStore;

pub struct ActionExecutor {
    store: Arc<dyn TicketStore>,
    notifier: Arc<dyn Notifier>,
    records: Arc<RecordStore>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    /// Bounded worker pool across tickets
    pool: Arc<Semaphore>,
    /// Per-ticket serialization locks, keyed by ticket id
    ticket_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    /// Submitted-but-unfinished chains across all tickets
    in_flight: Arc<AtomicUsize>,
    /// Status transitions performed by actions are fed back as events
    event_tx: mpsc::Sender<TicketEvent>,
    handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl ActionExecutor {
    pub fn new(
        store: Arc<dyn TicketStore>,
        notifier: Arc<dyn Notifier>,
        records: Arc<RecordStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
        event_tx: mpsc::Sender<TicketEvent>,
    ) -> Self {
        let pool = Arc::new(Semaphore::new(config.worker_pool_size));
        Self {
            store,
            notifier,
            records,
            clock,
            config,
            pool,
            ticket_locks: DashMap::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            event_tx,
            handles: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Current submitted-but-unfinished chain count.
    pub fn queue_depth(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Submit a pre-written chain for execution.
    ///
    /// The execution record must already exist with outcome `Pending`
    /// (written by the rule engine). Returns immediately; the chain runs on
    /// the pool. Fails with `SchedulerOverload` when the global queue
    /// ceiling is exceeded; that error is fatal and must reach operators.
    pub fn submit(
        self: &Arc<Self>,
        record_id: i64,
        ticket_id: &str,
        rule_id: &str,
        actions: Vec<Action>,
    ) -> CoreResult<()> {
        let depth = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        if depth > self.config.queue_ceiling {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let err = CoreError::SchedulerOverload {
                depth,
                ceiling: self.config.queue_ceiling,
            };
            tracing::error!(
                target: "executor",
                ticket_id = %ticket_id,
                rule_id = %rule_id,
                depth,
                ceiling = self.config.queue_ceiling,
                "Action storm: queue ceiling exceeded, chain rejected"
            );
            self.records
                .finish(record_id, Outcome::Aborted, vec![], self.clock.now_millis());
            return Err(err);
        }

        let this = Arc::clone(self);
        let ticket_id = ticket_id.to_string();
        let rule_id = rule_id.to_string();
        let handle = tokio::spawn(async move {
            this.run_chain(record_id, &ticket_id, &rule_id, actions).await;
            this.release_ticket_lock(&ticket_id);
            this.in_flight.fetch_sub(1, Ordering::SeqCst);
        });
        let mut handles = self.handles.lock();
        // Reap completed chains so the list tracks only live ones.
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        Ok(())
    }

    /// Drop a ticket's serialization lock once no chain holds or awaits
    /// it. The map entry's own `Arc` is the only reference left in that
    /// case; a later chain for the same ticket just recreates the entry.
    fn release_ticket_lock(&self, ticket_id: &str) {
        self.ticket_locks
            .remove_if(ticket_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Await completion of everything submitted so far. Test/shutdown aid.
    pub async fn wait_idle(&self) {
        loop {
            let batch: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
            if batch.is_empty() {
                break;
            }
            for handle in batch {
                let _ = handle.await;
            }
        }
    }

    async fn run_chain(&self, record_id: i64, ticket_id: &str, rule_id: &str, actions: Vec<Action>) {
        // Same-ticket chains queue here; a second chain simply waits its turn.
        let lock = self
            .ticket_locks
            .entry(ticket_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _ticket_guard = lock.lock().await;

        let _permit = match self.pool.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                // Pool closed during shutdown
                self.records
                    .finish(record_id, Outcome::Aborted, vec![], self.clock.now_millis());
                return;
            }
        };

        // A chain cancelled (or aborted) while queued must not run.
        match self.records.get(record_id) {
            Some(record) if record.outcome == Outcome::Pending => {}
            _ => return,
        }

        self.records.mark_in_progress(record_id, self.clock.now_millis());
        tracing::debug!(
            target: "executor",
            record_id,
            ticket_id = %ticket_id,
            rule_id = %rule_id,
            actions = actions.len(),
            "Chain started"
        );

        let mut outcomes: Vec<ActionOutcome> = Vec::with_capacity(actions.len());
        let mut failed: Option<(usize, String)> = None;

        for (index, action) in actions.iter().enumerate() {
            if failed.is_some() {
                outcomes.push(ActionOutcome {
                    index,
                    action: action.kind().to_string(),
                    status: ActionStatus::NotAttempted,
                    attempts: 0,
                });
                continue;
            }

            let max_attempts = if action.is_retryable() {
                self.config.retry_attempts.max(1)
            } else {
                1
            };

            let mut attempts = 0;
            let mut last_err: Option<CoreError> = None;
            while attempts < max_attempts {
                attempts += 1;
                match self.apply_action(ticket_id, action).await {
                    Ok(()) => {
                        last_err = None;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            target: "executor",
                            ticket_id = %ticket_id,
                            rule_id = %rule_id,
                            action = action.kind(),
                            attempt = attempts,
                            error = %e,
                            "Action attempt failed"
                        );
                        last_err = Some(e);
                        if attempts < max_attempts {
                            let backoff = self.config.retry_backoff_ms << (attempts - 1);
                            tokio::time::sleep(Duration::from_millis(backoff)).await;
                        }
                    }
                }
            }

            match last_err {
                None => outcomes.push(ActionOutcome {
                    index,
                    action: action.kind().to_string(),
                    status: ActionStatus::Applied,
                    attempts,
                }),
                Some(e) => {
                    outcomes.push(ActionOutcome {
                        index,
                        action: action.kind().to_string(),
                        status: ActionStatus::Failed {
                            reason: e.to_string(),
                        },
                        attempts,
                    });
                    failed = Some((index, e.to_string()));
                }
            }
        }

        let now = self.clock.now_millis();
        match failed {
            None => {
                self.records.finish(record_id, Outcome::Completed, outcomes, now);
                tracing::debug!(target: "executor", record_id, ticket_id = %ticket_id, "Chain completed");
            }
            Some((failed_index, reason)) => {
                let err = CoreError::ActionFailure {
                    index: failed_index,
                    reason: reason.clone(),
                };
                tracing::error!(
                    target: "executor",
                    record_id,
                    ticket_id = %ticket_id,
                    rule_id = %rule_id,
                    error = %err,
                    code = err.code(),
                    "Chain halted with partial failure"
                );
                self.records.finish(
                    record_id,
                    Outcome::PartialFailure {
                        failed_index,
                        reason,
                    },
                    outcomes,
                    now,
                );
            }
        }
    }

    async fn apply_action(&self, ticket_id: &str, action: &Action) -> CoreResult<()> {
        match action {
            Action::SetStatus(next) => {
                let mut ticket = self.store.get(ticket_id).await?;
                let from = ticket.status;
                if from == *next {
                    // Replay-idempotent: already there
                    return Ok(());
                }
                ticket.apply_transition(*next, self.clock.now_millis())?;
                self.store.save(ticket).await?;
                let event =
                    TicketEvent::updated(ticket_id, from, *next, self.clock.now_millis());
                if self.event_tx.send(event).await.is_err() {
                    tracing::debug!(target: "executor", "Event pump closed, transition not re-broadcast");
                }
                Ok(())
            }
            Action::SetPriority(priority) => {
                let mut ticket = self.store.get(ticket_id).await?;
                ticket.priority = *priority;
                self.store.save(ticket).await
            }
            Action::Reassign(target) => {
                let mut ticket = self.store.get(ticket_id).await?;
                ticket.assignees.clear();
                ticket.assignees.insert(target.clone());
                self.store.save(ticket).await
            }
            Action::AddTag(tag) => {
                let mut ticket = self.store.get(ticket_id).await?;
                ticket.tags.insert(tag.clone());
                self.store.save(ticket).await
            }
            Action::SendMessage {
                channel,
                template_id,
            } => self.notifier.send(channel, template_id, ticket_id).await,
            Action::Escalate { target_role } => {
                // Escalation is reassignment to a role principal
                let mut ticket = self.store.get(ticket_id).await?;
                ticket.assignees.clear();
                ticket.assignees.insert(format!("role:{}", target_role));
                self.store.save(ticket).await
            }
            Action::NotifyManager => {
                self.notifier
                    .send("manager", "sla-escalation", ticket_id)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditFeed;
    use crate::clock::ManualClock;
    use crate::notify::MemoryNotifier;
    use crate::store::MemoryTicketStore;
    use shared::models::{Priority, Ticket, TicketStatus};

    struct Harness {
        executor: Arc<ActionExecutor>,
        store: Arc<MemoryTicketStore>,
        notifier: Arc<MemoryNotifier>,
        records: Arc<RecordStore>,
        _clock: Arc<ManualClock>,
        _event_rx: mpsc::Receiver<TicketEvent>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryTicketStore::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let records = Arc::new(RecordStore::new(AuditFeed::new(256)));
        let clock = ManualClock::new(1_000);
        let (event_tx, event_rx) = mpsc::channel(64);
        let config = EngineConfig {
            retry_backoff_ms: 1, // keep tests fast
            ..EngineConfig::default()
        };
        let executor = Arc::new(ActionExecutor::new(
            store.clone(),
            notifier.clone(),
            records.clone(),
            clock.clone(),
            config,
            event_tx,
        ));
        Harness {
            executor,
            store,
            notifier,
            records,
            _clock: clock,
            _event_rx: event_rx,
        }
    }

    async fn seed_ticket(h: &Harness, id: &str) {
        h.store
            .save(Ticket::new(id, "support", Priority::Medium, 1_000))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn chain_runs_in_order_and_completes() {
        let h = harness();
        seed_ticket(&h, "tkt-1").await;
        let rec = h.records.try_begin("tkt-1", "r1", None, 1_000).unwrap();
        h.executor
            .submit(
                rec.id,
                "tkt-1",
                "r1",
                vec![
                    Action::SetStatus(TicketStatus::InProgress),
                    Action::AddTag("auto".into()),
                    Action::NotifyManager,
                ],
            )
            .unwrap();
        h.executor.wait_idle().await;

        let rec = h.records.get(rec.id).unwrap();
        assert_eq!(rec.outcome, Outcome::Completed);
        assert_eq!(rec.action_outcomes.len(), 3);
        let ticket = h.store.get("tkt-1").await.unwrap();
        assert_eq!(ticket.status, TicketStatus::InProgress);
        assert!(ticket.tags.contains("auto"));
        assert_eq!(h.notifier.sent_count(), 1);
    }

    #[tokio::test]
    async fn partial_failure_halts_chain_without_rollback() {
        let h = harness();
        seed_ticket(&h, "tkt-1").await;
        let rec = h.records.try_begin("tkt-1", "r1", None, 1_000).unwrap();
        h.executor
            .submit(
                rec.id,
                "tkt-1",
                "r1",
                vec![
                    Action::AddTag("first".into()),
                    // New -> Closed is illegal: mutating action, no retry
                    Action::SetStatus(TicketStatus::Closed),
                    Action::NotifyManager,
                ],
            )
            .unwrap();
        h.executor.wait_idle().await;

        let rec = h.records.get(rec.id).unwrap();
        assert!(matches!(
            rec.outcome,
            Outcome::PartialFailure { failed_index: 1, .. }
        ));
        assert_eq!(rec.action_outcomes[0].status, ActionStatus::Applied);
        assert!(matches!(
            rec.action_outcomes[1].status,
            ActionStatus::Failed { .. }
        ));
        assert_eq!(rec.action_outcomes[1].attempts, 1);
        assert_eq!(rec.action_outcomes[2].status, ActionStatus::NotAttempted);
        // First action stays applied
        let ticket = h.store.get("tkt-1").await.unwrap();
        assert!(ticket.tags.contains("first"));
        // Later action never ran
        assert_eq!(h.notifier.sent_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_chain_never_runs() {
        let h = harness();
        seed_ticket(&h, "tkt-1").await;
        let rec = h.records.try_begin("tkt-1", "r1", None, 1_000).unwrap();
        h.records.cancel(rec.id, 1_001).unwrap();
        h.executor
            .submit(rec.id, "tkt-1", "r1", vec![Action::AddTag("late".into())])
            .unwrap();
        h.executor.wait_idle().await;

        assert_eq!(h.records.get(rec.id).unwrap().outcome, Outcome::Aborted);
        let ticket = h.store.get("tkt-1").await.unwrap();
        assert!(ticket.tags.is_empty());
    }

    #[tokio::test]
    async fn retryable_action_retries_with_backoff() {
        let h = harness();
        seed_ticket(&h, "tkt-1").await;
        h.notifier.fail_next(2);
        let rec = h.records.try_begin("tkt-1", "r1", None, 1_000).unwrap();
        h.executor
            .submit(
                rec.id,
                "tkt-1",
                "r1",
                vec![Action::SendMessage {
                    channel: "email".into(),
                    template_id: "tpl".into(),
                }],
            )
            .unwrap();
        h.executor.wait_idle().await;

        let rec = h.records.get(rec.id).unwrap();
        assert_eq!(rec.outcome, Outcome::Completed);
        assert_eq!(rec.action_outcomes[0].attempts, 3);
        assert_eq!(h.notifier.sent_count(), 1);
    }

    #[tokio::test]
    async fn retry_budget_exhaustion_is_partial_failure() {
        let h = harness();
        seed_ticket(&h, "tkt-1").await;
        h.notifier.fail_next(10);
        let rec = h.records.try_begin("tkt-1", "r1", None, 1_000).unwrap();
        h.executor
            .submit(rec.id, "tkt-1", "r1", vec![Action::NotifyManager])
            .unwrap();
        h.executor.wait_idle().await;

        let rec = h.records.get(rec.id).unwrap();
        assert!(matches!(
            rec.outcome,
            Outcome::PartialFailure { failed_index: 0, .. }
        ));
        assert_eq!(rec.action_outcomes[0].attempts, 3);
    }

    #[tokio::test]
    async fn set_status_replay_is_idempotent() {
        let h = harness();
        seed_ticket(&h, "tkt-1").await;
        for attempt in 0..2 {
            let rec = h
                .records
                .try_begin("tkt-1", &format!("r{attempt}"), None, 1_000)
                .unwrap();
            h.executor
                .submit(
                    rec.id,
                    "tkt-1",
                    "r1",
                    vec![Action::SetStatus(TicketStatus::InProgress)],
                )
                .unwrap();
            h.executor.wait_idle().await;
            let rec = h.records.get(rec.id).unwrap();
            assert_eq!(rec.outcome, Outcome::Completed);
        }
        let ticket = h.store.get("tkt-1").await.unwrap();
        assert_eq!(ticket.status, TicketStatus::InProgress);
    }

    #[tokio::test]
    async fn escalate_reassigns_to_role_principal() {
        let h = harness();
        seed_ticket(&h, "tkt-1").await;
        let rec = h.records.try_begin("tkt-1", "r1", None, 1_000).unwrap();
        h.executor
            .submit(
                rec.id,
                "tkt-1",
                "r1",
                vec![Action::Escalate {
                    target_role: "senior-support".into(),
                }],
            )
            .unwrap();
        h.executor.wait_idle().await;
        let ticket = h.store.get("tkt-1").await.unwrap();
        assert_eq!(ticket.assignees.len(), 1);
        assert!(ticket.assignees.contains("role:senior-support"));
    }

    #[tokio::test]
    async fn queue_ceiling_rejects_with_overload() {
        let store = Arc::new(MemoryTicketStore::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let notifier_handle = notifier.clone();
        let records = Arc::new(RecordStore::new(AuditFeed::new(256)));
        let clock = ManualClock::new(1_000);
        let (event_tx, _event_rx) = mpsc::channel(64);
        let config = EngineConfig {
            queue_ceiling: 1,
            retry_backoff_ms: 500,
            ..EngineConfig::default()
        };
        let executor = Arc::new(ActionExecutor::new(
            store.clone(),
            notifier,
            records.clone(),
            clock,
            config,
            event_tx,
        ));
        store
            .save(Ticket::new("tkt-1", "support", Priority::Low, 1_000))
            .await
            .unwrap();

        let first = records.try_begin("tkt-1", "r1", None, 1_000).unwrap();
        let second = records.try_begin("tkt-1", "r2", None, 1_000).unwrap();
        // First chain parks in retry backoff, keeping the queue occupied
        notifier_handle.fail_next(1);
        executor
            .submit(first.id, "tkt-1", "r1", vec![Action::NotifyManager])
            .unwrap();
        let err = executor
            .submit(second.id, "tkt-1", "r2", vec![Action::AddTag("b".into())])
            .unwrap_err();
        assert!(matches!(err, CoreError::SchedulerOverload { .. }));
        assert_eq!(records.get(second.id).unwrap().outcome, Outcome::Aborted);
        executor.wait_idle().await;
    }

    #[tokio::test]
    async fn same_ticket_chains_never_overlap() {
        // Wall clock here: real InProgress windows are what the property is
        // about.
        let store = Arc::new(MemoryTicketStore::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let records = Arc::new(RecordStore::new(AuditFeed::new(256)));
        let (event_tx, _event_rx) = mpsc::channel(64);
        let executor = Arc::new(ActionExecutor::new(
            store.clone(),
            notifier,
            records.clone(),
            Arc::new(crate::clock::SystemClock),
            EngineConfig::default(),
            event_tx,
        ));
        store
            .save(Ticket::new("tkt-1", "support", Priority::Low, 1_000))
            .await
            .unwrap();

        for i in 0..8 {
            let rec = records
                .try_begin("tkt-1", &format!("r{i}"), None, 1_000)
                .unwrap();
            executor
                .submit(
                    rec.id,
                    "tkt-1",
                    &format!("r{i}"),
                    vec![Action::AddTag(format!("t{i}"))],
                )
                .unwrap();
        }
        executor.wait_idle().await;

        let mut windows: Vec<(i64, i64)> = records
            .for_ticket("tkt-1")
            .iter()
            .map(|r| (r.started_at.unwrap(), r.finished_at.unwrap()))
            .collect();
        windows.sort();
        for pair in windows.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "chains overlapped: {:?}", windows);
        }
        let ticket = store.get("tkt-1").await.unwrap();
        assert_eq!(ticket.tags.len(), 8);
    }

    #[tokio::test]
    async fn finished_chains_release_their_handles_and_locks() {
        let h = harness();
        seed_ticket(&h, "tkt-1").await;

        let rec = h.records.try_begin("tkt-1", "r1", None, 1_000).unwrap();
        h.executor
            .submit(rec.id, "tkt-1", "r1", vec![Action::AddTag("one".into())])
            .unwrap();
        loop {
            let done = h.executor.handles.lock().iter().all(|j| j.is_finished());
            if done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // A later submission reaps the finished chain's handle.
        seed_ticket(&h, "tkt-2").await;
        let rec = h.records.try_begin("tkt-2", "r1", None, 1_000).unwrap();
        h.executor
            .submit(rec.id, "tkt-2", "r1", vec![Action::AddTag("two".into())])
            .unwrap();
        assert_eq!(h.executor.handles.lock().len(), 1);

        h.executor.wait_idle().await;
        assert!(h.executor.ticket_locks.is_empty(), "lock entries must not outlive their chains");
    }
}
