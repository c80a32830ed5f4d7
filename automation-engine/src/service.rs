//! Engine facade
//!
//! [`AutomationService`] owns the wiring: ticket store, rule registry,
//! record store, audit feed, action executor, SLA scheduler, and the
//! event pump that feeds scheduler/executor output back into the rule
//! engine. Callers mutate tickets only through this surface, which is
//! what keeps the clock registrations and events consistent with the
//! stored state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use shared::{
    CoreError, CoreResult, ExecutionRecord, Field, Operator, Predicate, SlaPolicy, Ticket,
    TicketEvent, TicketEventKind, TicketStatus, Value,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditFeed};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::exec::ActionExecutor;
use crate::notify::Notifier;
use crate::records::RecordStore;
use crate::rules::{RuleEngine, RuleRegistry};
use crate::sla::{SchedulerHandle, SlaScheduler};
use crate::store::TicketStore;
use crate::tasks::{BackgroundTasks, TaskKind};

pub struct AutomationService {
    /// Identity of this engine instance, stamped into startup logs so
    /// overlapping restarts are tellable apart in aggregated output.
    instance_id: Uuid,
    clock: Arc<dyn Clock>,
    store: Arc<dyn TicketStore>,
    registry: Arc<RuleRegistry>,
    records: Arc<RecordStore>,
    audit: AuditFeed,
    executor: Arc<ActionExecutor>,
    engine: Arc<RuleEngine>,
    scheduler: SchedulerHandle,
    /// SLA policies keyed by department. Shared with the event pump so
    /// rule-driven reopens can start a clock too.
    policies: Arc<RwLock<HashMap<String, SlaPolicy>>>,
    tasks: BackgroundTasks,
}

impl AutomationService {
    /// Wire the engine and start its background tasks (SLA scheduler and
    /// event pump). Runs startup recovery before any event is consumed.
    pub fn start(
        config: EngineConfig,
        store: Arc<dyn TicketStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let audit = AuditFeed::new(config.audit_capacity);
        let records = Arc::new(RecordStore::new(audit.clone()));
        let (event_tx, mut event_rx) = mpsc::channel::<TicketEvent>(config.event_buffer);

        let executor = Arc::new(ActionExecutor::new(
            store.clone(),
            notifier,
            records.clone(),
            clock.clone(),
            config.clone(),
            event_tx.clone(),
        ));
        let registry = Arc::new(RuleRegistry::new());
        let engine = Arc::new(RuleEngine::new(
            registry.clone(),
            store.clone(),
            records.clone(),
            executor.clone(),
            clock.clone(),
        ));
        engine.recover();

        let (scheduler_task, scheduler) = SlaScheduler::new(
            store.clone(),
            clock.clone(),
            config.clone(),
            event_tx,
            audit.clone(),
        );

        let mut tasks = BackgroundTasks::new();
        let scheduler_cancel = tasks.shutdown_token();
        tasks.spawn(
            "sla-scheduler",
            TaskKind::Periodic,
            scheduler_task.run(scheduler_cancel),
        );

        let policies: Arc<RwLock<HashMap<String, SlaPolicy>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let pump_engine = engine.clone();
        let pump_store = store.clone();
        let pump_scheduler = scheduler.clone();
        let pump_policies = policies.clone();
        let pump_audit = audit.clone();
        let pump_cancel = tasks.shutdown_token();
        tasks.spawn("event-pump", TaskKind::Listener, async move {
            loop {
                tokio::select! {
                    _ = pump_cancel.cancelled() => break,
                    event = event_rx.recv() => match event {
                        Some(event) => {
                            sync_clock_with_transition(
                                &pump_store,
                                &pump_scheduler,
                                &pump_policies,
                                &pump_audit,
                                &event,
                            )
                            .await;
                            pump_engine.on_event(&event).await;
                        }
                        None => break,
                    },
                }
            }
        });

        let instance_id = Uuid::new_v4();
        info!(instance_id = %instance_id, "automation service started");
        Self {
            instance_id,
            clock,
            store,
            registry,
            records,
            audit,
            executor,
            engine,
            scheduler,
            policies,
            tasks,
        }
    }

    /// Install or replace the SLA policy for a department and recompute
    /// the clocks of every open ticket in it. Fired deadlines stay fired.
    pub async fn set_policy(&self, policy: SlaPolicy) -> CoreResult<()> {
        if policy.response_budget_ms <= 0
            || policy.resolution_budget_ms <= 0
            || policy.escalation_budget_ms <= 0
        {
            return Err(CoreError::Validation(
                "sla budgets must be positive".to_string(),
            ));
        }
        let department = policy.department.clone();
        self.policies
            .write()
            .insert(department.clone(), policy.clone());

        let in_department = Predicate::comparison(
            Field::Department,
            Operator::Equals,
            Value::Text(department),
        )?;
        for ticket in self.store.query(&in_department).await? {
            if !ticket.status.is_sla_terminal() {
                self.scheduler
                    .recompute(&ticket.id, None, policy.clone())
                    .await?;
            }
        }
        Ok(())
    }

    pub fn policy_for(&self, department: &str) -> Option<SlaPolicy> {
        self.policies.read().get(department).cloned()
    }

    /// Persist a new ticket, start its SLA clock, and run `TicketCreated`
    /// rules against it. Returns the execution records written.
    pub async fn create_ticket(&self, ticket: Ticket) -> CoreResult<Vec<ExecutionRecord>> {
        if ticket.id.is_empty() {
            return Err(CoreError::Validation("ticket id must not be empty".into()));
        }
        let ticket_id = ticket.id.clone();
        let department = ticket.department.clone();
        let anchor = ticket.created_at;
        self.store.save(ticket).await?;

        if let Some(policy) = self.policy_for(&department) {
            self.scheduler.register(&ticket_id, anchor, policy).await?;
        } else {
            warn!(ticket_id = %ticket_id, department = %department, "no sla policy for department, ticket untracked");
        }

        let event = TicketEvent::created(&ticket_id, self.clock.now_millis());
        Ok(self.engine.on_event(&event).await)
    }

    /// Transition a ticket through the status state machine.
    ///
    /// Resolving or closing destroys the SLA clock. Reopening starts a
    /// fresh clock anchored at the reopen time, and a `Closed` reopen is
    /// additionally pushed onto the audit feed with the operator.
    pub async fn set_status(
        &self,
        ticket_id: &str,
        next: TicketStatus,
        operator: Option<&str>,
    ) -> CoreResult<Vec<ExecutionRecord>> {
        let mut ticket = self.store.get(ticket_id).await?;
        let from = ticket.status;
        let now = self.clock.now_millis();
        ticket.apply_transition(next, now)?;
        let department = ticket.department.clone();
        self.store.save(ticket).await?;

        if next.is_sla_terminal() {
            self.scheduler.deregister(ticket_id).await?;
        } else if from.is_sla_terminal() {
            // Reopen: fresh clock, budgets counted from now.
            if let Some(policy) = self.policy_for(&department) {
                self.scheduler.register(ticket_id, now, policy).await?;
            }
            if from.is_audited_reopen(next) {
                self.audit.publish(AuditEvent::TicketReopened {
                    ticket_id: ticket_id.to_string(),
                    operator: operator.map(str::to_string),
                    at: now,
                });
            }
        }

        let mut event = TicketEvent::updated(ticket_id, from, next, now);
        if let Some(op) = operator {
            event = event.with_operator(op);
        }
        Ok(self.engine.on_event(&event).await)
    }

    /// Stamp the first agent response. Set-once; the response deadline
    /// stops mattering from here on.
    pub async fn record_first_response(&self, ticket_id: &str) -> CoreResult<()> {
        let mut ticket = self.store.get(ticket_id).await?;
        ticket.record_first_response(self.clock.now_millis());
        self.store.save(ticket).await
    }

    /// Move a ticket between departments: the clock keeps its anchor but
    /// picks up the destination's budgets.
    pub async fn set_department(&self, ticket_id: &str, department: &str) -> CoreResult<()> {
        let mut ticket = self.store.get(ticket_id).await?;
        ticket.department = department.to_string();
        let terminal = ticket.status.is_sla_terminal();
        self.store.save(ticket).await?;

        if !terminal
            && let Some(policy) = self.policy_for(department)
        {
            self.scheduler.recompute(ticket_id, None, policy).await?;
        }
        Ok(())
    }

    /// Operator-invoked rule firing. Cooldown and condition still apply.
    pub async fn run_rule(&self, rule_id: &str, ticket_id: &str) -> CoreResult<ExecutionRecord> {
        self.engine.run_rule(rule_id, ticket_id).await
    }

    /// Cancel a queued chain. Fails once the chain is InProgress or done.
    pub fn cancel_chain(&self, record_id: i64) -> CoreResult<()> {
        self.records.cancel(record_id, self.clock.now_millis())
    }

    pub async fn query_tickets(&self, predicate: &Predicate) -> CoreResult<Vec<Ticket>> {
        self.store.query(predicate).await
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    pub fn records(&self) -> &Arc<RecordStore> {
        &self.records
    }

    pub fn audit(&self) -> &AuditFeed {
        &self.audit
    }

    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn check_health(&self) -> usize {
        self.tasks.check_health()
    }

    /// Force an SLA fire pass, then wait for every resulting chain (and
    /// any chains those chains triggered) to settle. Test aid.
    pub async fn settle(&self) -> CoreResult<()> {
        loop {
            self.scheduler.tick().await?;
            self.executor.wait_idle().await;
            // Let the pump drain feedback events before re-checking.
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.executor.wait_idle().await;
            if self.executor.queue_depth() == 0 {
                return Ok(());
            }
        }
    }

    /// Graceful shutdown: wait for in-flight chains, then stop the
    /// scheduler and pump.
    pub async fn shutdown(self) {
        self.executor.wait_idle().await;
        self.tasks.shutdown().await;
        info!("automation service stopped");
    }
}

/// Mirror a status transition performed by a rule action onto the SLA
/// scheduler. Action chains write through the store, not through
/// [`AutomationService::set_status`], so the pump is the one place that
/// sees their `Updated` events and can keep the clocks honest: entering
/// a terminal status destroys the clock, leaving one starts a fresh
/// clock anchored at the transition time.
async fn sync_clock_with_transition(
    store: &Arc<dyn TicketStore>,
    scheduler: &SchedulerHandle,
    policies: &RwLock<HashMap<String, SlaPolicy>>,
    audit: &AuditFeed,
    event: &TicketEvent,
) {
    let TicketEventKind::Updated { from, to } = event.kind else {
        return;
    };
    if to.is_sla_terminal() && !from.is_sla_terminal() {
        if let Err(err) = scheduler.deregister(&event.ticket_id).await {
            warn!(ticket_id = %event.ticket_id, error = %err, "failed to destroy sla clock");
        }
    } else if from.is_sla_terminal() && !to.is_sla_terminal() {
        let department = match store.get(&event.ticket_id).await {
            Ok(ticket) => ticket.department,
            Err(err) => {
                warn!(ticket_id = %event.ticket_id, error = %err, "reopened ticket vanished, no sla clock started");
                return;
            }
        };
        let policy = policies.read().get(&department).cloned();
        if let Some(policy) = policy
            && let Err(err) = scheduler.register(&event.ticket_id, event.at, policy).await
        {
            warn!(ticket_id = %event.ticket_id, error = %err, "failed to start sla clock on reopen");
        }
        if from.is_audited_reopen(to) {
            audit.publish(AuditEvent::TicketReopened {
                ticket_id: event.ticket_id.clone(),
                operator: event.operator.clone(),
                at: event.at,
            });
        }
    }
}
